use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Message returned when a pipeline entry point is called without a usable file.
pub const NO_FILE_MESSAGE: &str = "没有上传文件";

/// Message returned for any failure on the local OCR path.
pub const OCR_FAILED_MESSAGE: &str = "OCR processing failed";

/// Message returned for any failure on the remote vision path.
pub const VISION_FAILED_MESSAGE: &str = "vision analysis failed";

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Recognition error: {0}")]
    Recognition(String),

    #[error("Remote call error: {0}")]
    RemoteCall(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScanError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::BadInput(_) => ErrorKind::BadInput,
            ScanError::Io(_) => ErrorKind::IoFailure,
            ScanError::Recognition(_) => ErrorKind::RecognitionFailure,
            ScanError::RemoteCall(_) => ErrorKind::RemoteCallFailure,
            ScanError::Config(_) => ErrorKind::Configuration,
        }
    }
}

impl From<std::io::Error> for ScanError {
    fn from(err: std::io::Error) -> Self {
        ScanError::Io(err.to_string())
    }
}

impl From<image::ImageError> for ScanError {
    fn from(err: image::ImageError) -> Self {
        ScanError::Io(err.to_string())
    }
}

/// Caller-visible classification of a failed extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadInput,
    IoFailure,
    RecognitionFailure,
    RemoteCallFailure,
    Configuration,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadInput => StatusCode::BAD_REQUEST,
            Self::IoFailure => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RecognitionFailure => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RemoteCallFailure => StatusCode::BAD_GATEWAY,
            Self::Configuration => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Failure envelope handed back by the pipeline entry points.
///
/// Only `kind` and `message` ever reach a caller over the wire. The
/// underlying [`ScanError`] is kept for logging and in-process inspection.
#[derive(Debug, Serialize)]
pub struct ExtractionError {
    kind: ErrorKind,
    #[serde(rename = "error")]
    message: &'static str,
    #[serde(skip)]
    cause: Option<ScanError>,
}

impl ExtractionError {
    pub fn new(message: &'static str, cause: ScanError) -> Self {
        Self {
            kind: cause.kind(),
            message,
            cause: Some(cause),
        }
    }

    pub fn no_file() -> Self {
        Self {
            kind: ErrorKind::BadInput,
            message: NO_FILE_MESSAGE,
            cause: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &'static str {
        self.message
    }

    pub fn cause(&self) -> Option<&ScanError> {
        self.cause.as_ref()
    }
}

impl std::fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message)
    }
}

impl std::error::Error for ExtractionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

impl IntoResponse for ExtractionError {
    fn into_response(self) -> Response {
        let status = self.kind.status();

        let body = Json(json!({
            "error": self.message,
            "kind": self.kind,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_error_omits_cause() {
        let err = ExtractionError::new(
            OCR_FAILED_MESSAGE,
            ScanError::Recognition("engine crashed reading /srv/uploads/secret.png".to_string()),
        );

        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"], OCR_FAILED_MESSAGE);
        assert_eq!(value["kind"], "recognition_failure");
        assert!(!value.to_string().contains("secret.png"));
        assert!(err.cause().is_some());
    }

    #[test]
    fn test_display_is_the_fixed_message() {
        let err = ExtractionError::new(
            VISION_FAILED_MESSAGE,
            ScanError::RemoteCall("401 Unauthorized".to_string()),
        );
        assert_eq!(err.to_string(), VISION_FAILED_MESSAGE);
        assert_eq!(err.kind(), ErrorKind::RemoteCallFailure);
    }

    #[test]
    fn test_source_exposes_cause() {
        use std::error::Error;

        let err = ExtractionError::new(OCR_FAILED_MESSAGE, ScanError::Io("disk full".to_string()));
        let source = err.source().expect("cause should be reachable");
        assert!(source.to_string().contains("disk full"));
    }

    #[test]
    fn test_no_file_error() {
        let err = ExtractionError::no_file();
        assert_eq!(err.kind(), ErrorKind::BadInput);
        assert_eq!(err.message(), NO_FILE_MESSAGE);
        assert!(err.cause().is_none());
    }

    #[test]
    fn test_kind_status_mapping() {
        assert_eq!(ErrorKind::BadInput.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorKind::RemoteCallFailure.status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ErrorKind::Configuration.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}

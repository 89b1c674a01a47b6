use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to an image written to disk by the upload layer.
///
/// The pipeline only borrows the file; it never moves or deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub path: PathBuf,
    pub original_name: String,
}

impl UploadedImage {
    pub fn new(path: impl Into<PathBuf>, original_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            original_name: original_name.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// MIME type for inlining the image in a data URL.
    ///
    /// Prefers the client's file extension, then sniffs the bytes, then
    /// falls back to JPEG.
    pub fn mime_type(&self, bytes: &[u8]) -> String {
        if let Some(mime) = mime_guess::from_path(&self.original_name)
            .first()
            .filter(|mime| mime.type_() == mime_guess::mime::IMAGE)
        {
            return mime.essence_str().to_string();
        }

        infer::get(bytes)
            .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| "image/jpeg".to_string())
    }
}

/// Successful outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub id: String,
    pub result: String,
}

impl ExtractionResult {
    pub fn new(id: Uuid, result: String) -> Self {
        Self {
            id: id.to_string(),
            result,
        }
    }
}

use base64::{engine::general_purpose::STANDARD, Engine};
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ExtractionError, Result, ScanError, NO_FILE_MESSAGE};
use crate::models::{ExtractionResult, UploadedImage};
use crate::ocr::{OcrExtractor, Preprocessor};
use crate::vision::VisionProvider;

use super::{Stage, Strategy};

/// Label printed in front of locally recognized text.
pub const RECOGNIZED_TEXT_LABEL: &str = "图片中识别到的文字：";

/// Drives one extraction per call, for either strategy.
///
/// Holds only read-only collaborators, so a single instance is shared across
/// all concurrent requests.
#[derive(Clone)]
pub struct ImagePipeline {
    preprocessor: Preprocessor,
    ocr: OcrExtractor,
    vision: VisionProvider,
    languages: String,
    prompt: String,
}

impl ImagePipeline {
    pub fn new(config: &Config) -> Self {
        Self::from_parts(
            config,
            OcrExtractor::new(&config.ocr),
            VisionProvider::new(&config.vision),
        )
    }

    pub fn from_parts(config: &Config, ocr: OcrExtractor, vision: VisionProvider) -> Self {
        Self {
            preprocessor: Preprocessor::new(&config.ocr),
            ocr,
            vision,
            languages: config.ocr.languages.clone(),
            prompt: config.vision.prompt.clone(),
        }
    }

    pub fn ocr(&self) -> &OcrExtractor {
        &self.ocr
    }

    pub fn vision(&self) -> &VisionProvider {
        &self.vision
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }

    pub async fn run_local_ocr(
        &self,
        image: Option<&UploadedImage>,
    ) -> std::result::Result<ExtractionResult, ExtractionError> {
        self.run(Strategy::LocalOcr, image).await
    }

    pub async fn run_vision_query(
        &self,
        image: Option<&UploadedImage>,
    ) -> std::result::Result<ExtractionResult, ExtractionError> {
        self.run(Strategy::RemoteVision, image).await
    }

    /// Run one extraction and normalize the outcome.
    ///
    /// Missing input is rejected before any work is done. Every other failure
    /// is logged with its cause and collapsed into the strategy's fixed
    /// message.
    pub async fn run(
        &self,
        strategy: Strategy,
        image: Option<&UploadedImage>,
    ) -> std::result::Result<ExtractionResult, ExtractionError> {
        let Some(image) = image else {
            warn!(%strategy, "Extraction requested without a file");
            return Err(ExtractionError::no_file());
        };

        if !tokio::fs::metadata(image.path())
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
        {
            let cause = ScanError::BadInput(format!("No such file: {}", image.path().display()));
            warn!(%strategy, error = %cause, "Extraction requested for a missing file");
            return Err(ExtractionError::new(NO_FILE_MESSAGE, cause));
        }

        let id = Uuid::new_v4();
        let span = info_span!(
            "extraction",
            %id,
            %strategy,
            file = %image.original_name
        );

        async move {
            debug!(stage = %Stage::Received);

            match self.extract(strategy, image).await {
                Ok(result) => {
                    debug!(stage = %Stage::Succeeded, result_len = result.len());
                    Ok(ExtractionResult::new(id, result))
                }
                Err(cause) => {
                    debug!(stage = %Stage::Failed);
                    error!(
                        kind = ?cause.kind(),
                        error = %cause,
                        "{}",
                        strategy.failure_message()
                    );
                    Err(ExtractionError::new(strategy.failure_message(), cause))
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn extract(&self, strategy: Strategy, image: &UploadedImage) -> Result<String> {
        match strategy {
            Strategy::LocalOcr => self.preprocess_and_recognize(image).await,
            Strategy::RemoteVision => self.query_remote(image).await,
        }
    }

    async fn preprocess_and_recognize(&self, image: &UploadedImage) -> Result<String> {
        debug!(stage = %Stage::Preprocessing);
        let derived = self.preprocessor.preprocess(image.path()).await?;

        debug!(stage = %Stage::Recognizing, derived = %derived.path().display());
        let text = self.ocr.recognize_derived(derived, &self.languages).await?;
        Ok(format_recognized_text(&text))
    }

    async fn query_remote(&self, image: &UploadedImage) -> Result<String> {
        let bytes = tokio::fs::read(image.path()).await.map_err(|e| {
            ScanError::Io(format!("Failed to read {}: {e}", image.path().display()))
        })?;
        let mime_type = image.mime_type(&bytes);
        let encoded = STANDARD.encode(&bytes);

        debug!(stage = %Stage::Recognizing, %mime_type, bytes = bytes.len());
        self.vision.query(&encoded, &mime_type, &self.prompt).await
    }
}

pub fn format_recognized_text(text: &str) -> String {
    format!("{RECOGNIZED_TEXT_LABEL}{}", text.trim())
}

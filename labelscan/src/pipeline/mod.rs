//! Image analysis pipeline
//!
//! One entry point, [`ImagePipeline::run`], parameterized by [`Strategy`]:
//! - `LocalOcr`: preprocess into a derived file, recognize it with a
//!   per-call Tesseract engine, delete the derived file
//! - `RemoteVision`: base64 the original upload and ask the vision model
//!
//! Either way the caller gets an [`ExtractionResult`](crate::models::ExtractionResult)
//! or an [`ExtractionError`](crate::error::ExtractionError) carrying one fixed
//! message per strategy.

mod orchestrator;

use std::fmt;

use crate::error::{OCR_FAILED_MESSAGE, VISION_FAILED_MESSAGE};

pub use orchestrator::{format_recognized_text, ImagePipeline, RECOGNIZED_TEXT_LABEL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    LocalOcr,
    RemoteVision,
}

impl Strategy {
    pub fn failure_message(&self) -> &'static str {
        match self {
            Strategy::LocalOcr => OCR_FAILED_MESSAGE,
            Strategy::RemoteVision => VISION_FAILED_MESSAGE,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::LocalOcr => write!(f, "local_ocr"),
            Strategy::RemoteVision => write!(f, "remote_vision"),
        }
    }
}

/// Per-request lifecycle, emitted as debug events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Preprocessing,
    Recognizing,
    Succeeded,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Preprocessing => "preprocessing",
            Stage::Recognizing => "recognizing",
            Stage::Succeeded => "succeeded",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

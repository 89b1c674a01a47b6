//! Local OCR
//!
//! Two stages make up the local recognition path:
//! - `Preprocessor` turns an uploaded image into a greyscale, contrast
//!   stretched, sharpened derived file next to the original
//! - `OcrExtractor` runs Tesseract (via leptess) on that file with an engine
//!   that is started for the call and torn down before it returns
//!
//! # Configuration
//!
//! Controlled via `OcrConfig` (see `config.rs`):
//! - `languages`: Tesseract language set, e.g. "chi_sim" or "chi_sim+eng"
//! - `data_path`: optional tessdata directory
//! - `max_image_dimension`: bounding box for downscaling large photos
//!
//! # Usage
//!
//! ```rust,ignore
//! let derived = Preprocessor::new(&config.ocr).preprocess(&path).await?;
//! // Consumes `derived`; the file is gone once the engine is released
//! let text = OcrExtractor::new(&config.ocr)
//!     .recognize_derived(derived, &config.ocr.languages)
//!     .await?;
//! ```

mod extractor;
mod preprocessing;

pub use extractor::{EngineFactory, OcrExtractor, RecognitionEngine, TesseractFactory};
pub use preprocessing::{preprocess_image, PreprocessedImage, Preprocessor, DERIVED_PREFIX};

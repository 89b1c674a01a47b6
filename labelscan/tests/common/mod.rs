#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::{Rgb, RgbImage};

use labelscan::config::{Config, OcrConfig, ServerConfig, UploadConfig, VisionConfig};
use labelscan::error::{Result, ScanError};
use labelscan::ocr::{EngineFactory, OcrExtractor, RecognitionEngine};
use labelscan::pipeline::ImagePipeline;
use labelscan::vision::VisionProvider;

/// Write a small high-contrast test image; the format follows the extension.
pub fn write_label_image(dir: &Path, name: &str) -> PathBuf {
    let img = RgbImage::from_fn(120, 40, |x, y| {
        if (x / 10 + y / 10) % 2 == 0 {
            Rgb([245, 240, 230])
        } else {
            Rgb([25, 20, 30])
        }
    });
    let path = dir.join(name);
    img.save(&path)
        .unwrap_or_else(|e| panic!("Failed to write test image '{name}': {e}"));
    path
}

/// Names of derived files still present in `dir`.
pub fn leftover_derived_files(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .expect("read test dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("preprocessed_"))
        .collect()
}

pub fn test_config(upload_dir: &Path) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            max_upload_bytes: 1024 * 1024,
        },
        uploads: UploadConfig {
            dir: upload_dir.to_path_buf(),
        },
        ocr: OcrConfig::default(),
        vision: VisionConfig {
            timeout_secs: 5,
            ..VisionConfig::default()
        },
    }
}

#[derive(Debug, Clone)]
pub enum FakeBehavior {
    Text(String),
    Fail,
    Panic,
    /// Blocks for the given time, then reports whether its input still exists.
    Slow(Duration),
}

/// Engine factory that never touches Tesseract.
///
/// Every engine records the path it was asked to read and whether that file
/// existed at recognition time.
pub struct FakeEngineFactory {
    behavior: FakeBehavior,
    created: AtomicUsize,
    seen: Arc<Mutex<Vec<(PathBuf, bool)>>>,
}

impl FakeEngineFactory {
    pub fn new(behavior: FakeBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            created: AtomicUsize::new(0),
            seen: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn text(text: &str) -> Arc<Self> {
        Self::new(FakeBehavior::Text(text.to_string()))
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<(PathBuf, bool)> {
        self.seen.lock().expect("seen lock").clone()
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create(&self, _languages: &str) -> Result<Box<dyn RecognitionEngine>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEngine {
            behavior: self.behavior.clone(),
            seen: Arc::clone(&self.seen),
        }))
    }
}

struct FakeEngine {
    behavior: FakeBehavior,
    seen: Arc<Mutex<Vec<(PathBuf, bool)>>>,
}

impl RecognitionEngine for FakeEngine {
    fn recognize(&mut self, image_path: &Path) -> Result<String> {
        self.seen
            .lock()
            .expect("seen lock")
            .push((image_path.to_path_buf(), image_path.is_file()));

        match &self.behavior {
            FakeBehavior::Text(text) => Ok(text.clone()),
            FakeBehavior::Fail => Err(ScanError::Recognition(
                "fake engine could not read the image".to_string(),
            )),
            FakeBehavior::Panic => panic!("fake engine crashed"),
            FakeBehavior::Slow(delay) => {
                std::thread::sleep(*delay);
                let still_there = image_path.is_file();
                self.seen
                    .lock()
                    .expect("seen lock")
                    .push((image_path.to_path_buf(), still_there));
                Ok("slow result".to_string())
            }
        }
    }
}

pub fn pipeline_with_engine(config: &Config, factory: Arc<FakeEngineFactory>) -> ImagePipeline {
    ImagePipeline::from_parts(
        config,
        OcrExtractor::with_factory(factory),
        VisionProvider::new(&config.vision),
    )
}

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use leptess::LepTess;
use tracing::{debug, info, warn, Span};

use crate::config::OcrConfig;
use crate::error::{Result, ScanError};

use super::preprocessing::PreprocessedImage;

/// One live recognition engine. Released when dropped.
pub trait RecognitionEngine {
    fn recognize(&mut self, image_path: &Path) -> Result<String>;
}

/// Creates a fresh, unshared engine for a single recognition call.
pub trait EngineFactory: Send + Sync {
    fn create(&self, languages: &str) -> Result<Box<dyn RecognitionEngine>>;
}

pub struct TesseractFactory {
    data_path: Option<String>,
}

impl TesseractFactory {
    pub fn new(data_path: Option<String>) -> Self {
        Self { data_path }
    }
}

impl EngineFactory for TesseractFactory {
    fn create(&self, languages: &str) -> Result<Box<dyn RecognitionEngine>> {
        let engine = LepTess::new(self.data_path.as_deref(), languages).map_err(|e| {
            ScanError::Recognition(format!(
                "Failed to initialize Tesseract for '{languages}': {e}"
            ))
        })?;
        Ok(Box::new(TesseractEngine { engine }))
    }
}

struct TesseractEngine {
    engine: LepTess,
}

impl RecognitionEngine for TesseractEngine {
    fn recognize(&mut self, image_path: &Path) -> Result<String> {
        self.engine
            .set_image(image_path)
            .map_err(|e| ScanError::Recognition(format!("Failed to set image: {e}")))?;
        self.engine
            .get_utf8_text()
            .map_err(|e| ScanError::Recognition(format!("Failed to extract text: {e}")))
    }
}

/// Scoped ownership of one engine; `Drop` tears it down on every path,
/// including unwinding.
struct EngineLease {
    engine: Option<Box<dyn RecognitionEngine>>,
    live: Arc<AtomicUsize>,
}

impl EngineLease {
    fn acquire(factory: &dyn EngineFactory, languages: &str, live: Arc<AtomicUsize>) -> Result<Self> {
        let engine = factory.create(languages)?;
        live.fetch_add(1, Ordering::SeqCst);
        debug!(languages, "Recognition engine acquired");
        Ok(Self {
            engine: Some(engine),
            live,
        })
    }

    fn recognize(&mut self, image_path: &Path) -> Result<String> {
        match self.engine.as_mut() {
            Some(engine) => engine.recognize(image_path),
            None => Err(ScanError::Recognition(
                "Recognition engine already released".to_string(),
            )),
        }
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            drop(engine);
            self.live.fetch_sub(1, Ordering::SeqCst);
            debug!("Recognition engine released");
        }
    }
}

/// Local OCR over a per-call engine.
///
/// Nothing engine-related is shared between calls; the extractor only holds
/// the factory and a live-engine counter.
#[derive(Clone)]
pub struct OcrExtractor {
    factory: Arc<dyn EngineFactory>,
    live: Arc<AtomicUsize>,
}

impl OcrExtractor {
    pub fn new(config: &OcrConfig) -> Self {
        info!(
            languages = %config.languages,
            data_path = ?config.data_path,
            "Tesseract OCR configured"
        );
        Self::with_factory(Arc::new(TesseractFactory::new(config.data_path.clone())))
    }

    pub fn with_factory(factory: Arc<dyn EngineFactory>) -> Self {
        Self {
            factory,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of engines currently alive across all in-flight calls.
    pub fn live_engines(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Recognize text in `image_path` with a freshly started engine.
    ///
    /// The engine is created, used and released inside one blocking task, so
    /// it is gone by the time this returns, whatever the outcome.
    pub async fn recognize(&self, image_path: &Path, languages: &str) -> Result<String> {
        let factory = Arc::clone(&self.factory);
        let live = Arc::clone(&self.live);
        let image_path = image_path.to_path_buf();
        let languages = languages.to_string();

        tokio::task::spawn_blocking(move || {
            let mut lease = EngineLease::acquire(factory.as_ref(), &languages, live)?;
            lease.recognize(&image_path)
        })
        .await
        .map_err(|e| ScanError::Recognition(format!("OCR task panicked: {e}")))?
    }

    /// Recognize a derived image, then delete it.
    ///
    /// The derived file moves into the blocking task and is removed there,
    /// after the engine is released. If the caller stops waiting, the task
    /// still runs to completion: the engine never reads a deleted file and
    /// the file never outlives the engine.
    pub async fn recognize_derived(
        &self,
        derived: PreprocessedImage,
        languages: &str,
    ) -> Result<String> {
        let factory = Arc::clone(&self.factory);
        let live = Arc::clone(&self.live);
        let languages = languages.to_string();
        let span = Span::current();

        tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            let recognized = EngineLease::acquire(factory.as_ref(), &languages, live)
                .and_then(|mut lease| lease.recognize(derived.path()));

            let derived_path = derived.path().to_path_buf();
            match derived.cleanup() {
                Ok(()) => debug!(stage = "cleanup", path = %derived_path.display()),
                Err(e) => warn!(
                    path = %derived_path.display(),
                    error = %e,
                    "Failed to remove derived image"
                ),
            }

            recognized
        })
        .await
        .map_err(|e| ScanError::Recognition(format!("OCR task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct ScriptedEngine {
        outcome: std::result::Result<String, String>,
        panic: bool,
        seen: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl RecognitionEngine for ScriptedEngine {
        fn recognize(&mut self, image_path: &Path) -> Result<String> {
            self.seen.lock().unwrap().push(image_path.to_path_buf());
            if self.panic {
                panic!("engine blew up");
            }
            self.outcome.clone().map_err(ScanError::Recognition)
        }
    }

    struct ScriptedFactory {
        outcome: std::result::Result<String, String>,
        fail_init: bool,
        panic: bool,
        created: AtomicUsize,
        seen: Arc<Mutex<Vec<PathBuf>>>,
    }

    impl ScriptedFactory {
        fn returning(outcome: std::result::Result<&str, &str>) -> Self {
            Self {
                outcome: outcome.map(String::from).map_err(String::from),
                fail_init: false,
                panic: false,
                created: AtomicUsize::new(0),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    impl EngineFactory for ScriptedFactory {
        fn create(&self, languages: &str) -> Result<Box<dyn RecognitionEngine>> {
            if self.fail_init {
                return Err(ScanError::Recognition(format!("no traineddata for {languages}")));
            }
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedEngine {
                outcome: self.outcome.clone(),
                panic: self.panic,
                seen: Arc::clone(&self.seen),
            }))
        }
    }

    #[tokio::test]
    async fn test_recognize_returns_engine_text() {
        let factory = Arc::new(ScriptedFactory::returning(Ok("NUTRITION FACTS\n")));
        let ocr = OcrExtractor::with_factory(factory.clone());

        let text = ocr.recognize(Path::new("/tmp/x.png"), "eng").await.unwrap();

        assert_eq!(text, "NUTRITION FACTS\n");
        assert_eq!(ocr.live_engines(), 0);
        assert_eq!(
            factory.seen.lock().unwrap().as_slice(),
            &[PathBuf::from("/tmp/x.png")]
        );
    }

    #[tokio::test]
    async fn test_each_call_gets_a_fresh_engine() {
        let factory = Arc::new(ScriptedFactory::returning(Ok("a")));
        let ocr = OcrExtractor::with_factory(factory.clone());

        for _ in 0..3 {
            ocr.recognize(Path::new("/tmp/x.png"), "eng").await.unwrap();
        }

        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
        assert_eq!(ocr.live_engines(), 0);
    }

    #[tokio::test]
    async fn test_engine_released_on_recognition_error() {
        let ocr = OcrExtractor::with_factory(Arc::new(ScriptedFactory::returning(Err("bad pix"))));

        let result = ocr.recognize(Path::new("/tmp/x.png"), "eng").await;

        assert!(matches!(result, Err(ScanError::Recognition(_))));
        assert_eq!(ocr.live_engines(), 0);
    }

    #[tokio::test]
    async fn test_engine_released_on_panic() {
        let mut factory = ScriptedFactory::returning(Ok("never"));
        factory.panic = true;
        let ocr = OcrExtractor::with_factory(Arc::new(factory));

        let result = ocr.recognize(Path::new("/tmp/x.png"), "eng").await;

        match result {
            Err(ScanError::Recognition(msg)) => assert!(msg.contains("panicked")),
            other => panic!("Expected recognition error, got {other:?}"),
        }
        assert_eq!(ocr.live_engines(), 0);
    }

    #[tokio::test]
    async fn test_init_failure_is_recognition_error() {
        let mut factory = ScriptedFactory::returning(Ok("never"));
        factory.fail_init = true;
        let ocr = OcrExtractor::with_factory(Arc::new(factory));

        let result = ocr.recognize(Path::new("/tmp/x.png"), "klingon").await;

        match result {
            Err(ScanError::Recognition(msg)) => assert!(msg.contains("klingon")),
            other => panic!("Expected recognition error, got {other:?}"),
        }
        assert_eq!(ocr.live_engines(), 0);
    }

    struct FileCheckingEngine {
        existed: Arc<Mutex<Option<bool>>>,
    }

    impl RecognitionEngine for FileCheckingEngine {
        fn recognize(&mut self, image_path: &Path) -> Result<String> {
            *self.existed.lock().unwrap() = Some(image_path.is_file());
            Ok("ok".to_string())
        }
    }

    struct FileCheckingFactory {
        existed: Arc<Mutex<Option<bool>>>,
    }

    impl EngineFactory for FileCheckingFactory {
        fn create(&self, _languages: &str) -> Result<Box<dyn RecognitionEngine>> {
            Ok(Box::new(FileCheckingEngine {
                existed: Arc::clone(&self.existed),
            }))
        }
    }

    #[tokio::test]
    async fn test_recognize_derived_deletes_file_after_engine_reads_it() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("label.png");
        image::RgbImage::from_pixel(40, 20, image::Rgb([200, 10, 10]))
            .save(&source)
            .unwrap();
        let derived = crate::ocr::preprocess_image(&source, 4096).unwrap();
        let derived_path = derived.path().to_path_buf();

        let existed = Arc::new(Mutex::new(None));
        let ocr = OcrExtractor::with_factory(Arc::new(FileCheckingFactory {
            existed: Arc::clone(&existed),
        }));

        let text = ocr.recognize_derived(derived, "eng").await.unwrap();

        assert_eq!(text, "ok");
        assert_eq!(*existed.lock().unwrap(), Some(true));
        assert!(!derived_path.exists());
        assert!(source.exists());
        assert_eq!(ocr.live_engines(), 0);
    }

    #[tokio::test]
    async fn test_recognize_derived_deletes_file_on_init_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("label.png");
        image::RgbImage::from_pixel(40, 20, image::Rgb([10, 10, 200]))
            .save(&source)
            .unwrap();
        let derived = crate::ocr::preprocess_image(&source, 4096).unwrap();
        let derived_path = derived.path().to_path_buf();

        let mut factory = ScriptedFactory::returning(Ok("never"));
        factory.fail_init = true;
        let ocr = OcrExtractor::with_factory(Arc::new(factory));

        let result = ocr.recognize_derived(derived, "klingon").await;

        assert!(matches!(result, Err(ScanError::Recognition(_))));
        assert!(!derived_path.exists());
        assert_eq!(ocr.live_engines(), 0);
    }
}

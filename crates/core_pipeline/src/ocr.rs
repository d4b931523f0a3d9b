//! OCR module
//!
//! Runs Tesseract (via leptess) over a preprocessed ticket image with a
//! restricted character whitelist. Every call opens a fresh engine session,
//! configures it, recognizes, and drops it before returning, so repeated
//! scans do not accumulate engine memory.

use crate::error::ScanError;
use crate::types::{ProcessedImage, RecognitionResult};
use leptess::{LepTess, Variable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// Tesseract page segmentation mode for a single uniform block of text
pub const SINGLE_BLOCK_PAGE_SEG_MODE: &str = "6";

/// Characters the engine is allowed to output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CharsetProfile {
    /// Digits and space, for purely numeric ticket layouts
    Numeric,
    /// Digits, space, A-Z, brackets and dash, e.g. `A 23 24 29 36 45 [06 09]`
    AlphanumericBrackets,
}

impl CharsetProfile {
    pub fn whitelist(&self) -> &'static str {
        match self {
            CharsetProfile::Numeric => "0123456789 ",
            CharsetProfile::AlphanumericBrackets => "0123456789 ABCDEFGHIJKLMNOPQRSTUVWXYZ[]-",
        }
    }
}

/// Engine configuration for one recognition pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionOptions {
    pub profile: CharsetProfile,
    /// Assume the image holds one compact paragraph
    pub single_block: bool,
    /// Tesseract language code
    pub language: String,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            profile: CharsetProfile::AlphanumericBrackets,
            single_block: true,
            language: "eng".to_string(),
        }
    }
}

/// Phase of a recognition pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionStage {
    Initializing,
    EngineLoaded,
    ImageLoaded,
    Recognizing,
    Done,
}

/// Progress event emitted during recognition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognitionProgress {
    pub stage: RecognitionStage,
    /// Completion fraction in `[0, 1]`
    pub fraction: f32,
}

/// Sending half of the progress channel
///
/// Fractions are clamped to `[0, 1]` and never go backwards.
#[derive(Debug)]
pub struct ProgressSink {
    tx: Option<UnboundedSender<RecognitionProgress>>,
    last: f32,
}

impl ProgressSink {
    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self { tx: None, last: 0.0 }
    }

    pub fn report(&mut self, stage: RecognitionStage, fraction: f32) {
        let fraction = fraction.clamp(0.0, 1.0).max(self.last);
        self.last = fraction;
        if let Some(tx) = &self.tx {
            // Receiver may be gone; progress is advisory
            let _ = tx.send(RecognitionProgress { stage, fraction });
        }
    }
}

/// Create a progress channel
pub fn progress_channel() -> (ProgressSink, UnboundedReceiver<RecognitionProgress>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSink {
            tx: Some(tx),
            last: 0.0,
        },
        rx,
    )
}

/// One live engine instance; released when dropped
pub trait OcrSession {
    fn set_whitelist(&mut self, chars: &str) -> Result<(), ScanError>;

    fn set_page_seg_mode(&mut self, mode: &str) -> Result<(), ScanError>;

    /// Load encoded image bytes (PNG, JPEG, ...)
    fn set_image(&mut self, bytes: &[u8]) -> Result<(), ScanError>;

    /// Run recognition and return the UTF-8 text
    fn text(&mut self) -> Result<String, ScanError>;

    fn mean_confidence(&mut self) -> Option<i32>;
}

/// Factory for engine sessions
pub trait OcrBackend: Send + Sync + 'static {
    type Session: OcrSession;

    fn open(&self, language: &str) -> Result<Self::Session, ScanError>;
}

/// Tesseract backend
#[derive(Debug, Clone, Default)]
pub struct TesseractBackend {
    /// Directory holding `tessdata`; system default when `None`
    pub datapath: Option<PathBuf>,
}

impl TesseractBackend {
    pub fn new(datapath: Option<PathBuf>) -> Self {
        Self { datapath }
    }
}

/// A Tesseract engine instance
pub struct TesseractSession {
    inner: LepTess,
}

impl OcrBackend for TesseractBackend {
    type Session = TesseractSession;

    fn open(&self, language: &str) -> Result<TesseractSession, ScanError> {
        let datapath = self
            .datapath
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        let inner = LepTess::new(datapath.as_deref(), language).map_err(|e| {
            ScanError::EngineInitError(format!(
                "Tesseract with language '{}': {}. Is Tesseract installed?",
                language, e
            ))
        })?;
        Ok(TesseractSession { inner })
    }
}

impl OcrSession for TesseractSession {
    fn set_whitelist(&mut self, chars: &str) -> Result<(), ScanError> {
        self.inner
            .set_variable(Variable::TesseditCharWhitelist, chars)
            .map_err(|e| ScanError::EngineInitError(format!("Failed to set whitelist: {}", e)))
    }

    fn set_page_seg_mode(&mut self, mode: &str) -> Result<(), ScanError> {
        self.inner
            .set_variable(Variable::TesseditPagesegMode, mode)
            .map_err(|e| ScanError::EngineInitError(format!("Failed to set PSM: {}", e)))
    }

    fn set_image(&mut self, bytes: &[u8]) -> Result<(), ScanError> {
        self.inner.set_image_from_mem(bytes).map_err(|e| {
            ScanError::RecognitionError(format!("Failed to load image into Tesseract: {}", e))
        })
    }

    fn text(&mut self) -> Result<String, ScanError> {
        self.inner
            .get_utf8_text()
            .map_err(|e| ScanError::RecognitionError(format!("Failed to extract text: {}", e)))
    }

    fn mean_confidence(&mut self) -> Option<i32> {
        Some(self.inner.mean_text_conf())
    }
}

/// Runs recognition passes against a backend
pub struct OcrAdapter<B: OcrBackend> {
    backend: Arc<B>,
}

impl<B: OcrBackend> Clone for OcrAdapter<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
        }
    }
}

impl<B: OcrBackend> OcrAdapter<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Recognize text in a preprocessed image
    ///
    /// The engine runs on the blocking pool. Its session lives only inside
    /// that task and is dropped on every exit path.
    pub async fn recognize(
        &self,
        image: &ProcessedImage,
        options: &RecognitionOptions,
        progress: ProgressSink,
    ) -> Result<RecognitionResult, ScanError> {
        self.recognize_holding(image, options, progress, ()).await
    }

    /// Like [`recognize`](Self::recognize), moving `hold` into the blocking task
    ///
    /// `hold` is dropped after the engine session is released, even when the
    /// returned future is dropped before the task finishes.
    pub async fn recognize_holding<H: Send + 'static>(
        &self,
        image: &ProcessedImage,
        options: &RecognitionOptions,
        progress: ProgressSink,
        hold: H,
    ) -> Result<RecognitionResult, ScanError> {
        let backend = Arc::clone(&self.backend);
        let bytes = image.bytes.clone();
        let options = options.clone();

        tokio::task::spawn_blocking(move || {
            let result = run_session(backend.as_ref(), &bytes, &options, progress);
            drop(hold);
            result
        })
        .await
        .map_err(|e| ScanError::RecognitionError(format!("OCR task failed: {}", e)))?
    }
}

fn run_session<B: OcrBackend>(
    backend: &B,
    bytes: &[u8],
    options: &RecognitionOptions,
    mut progress: ProgressSink,
) -> Result<RecognitionResult, ScanError> {
    progress.report(RecognitionStage::Initializing, 0.0);
    let mut session = backend.open(&options.language)?;

    session.set_whitelist(options.profile.whitelist())?;
    if options.single_block {
        session.set_page_seg_mode(SINGLE_BLOCK_PAGE_SEG_MODE)?;
    }
    debug!(
        "OCR engine ready: language {}, profile {:?}, single block {}",
        options.language, options.profile, options.single_block
    );
    progress.report(RecognitionStage::EngineLoaded, 0.3);

    session.set_image(bytes)?;
    progress.report(RecognitionStage::ImageLoaded, 0.5);

    progress.report(RecognitionStage::Recognizing, 0.6);
    let text = session.text()?;
    let mean_confidence = session.mean_confidence();
    progress.report(RecognitionStage::Done, 1.0);

    debug!(
        "OCR produced {} line(s), mean confidence {:?}",
        text.lines().count(),
        mean_confidence
    );
    Ok(RecognitionResult {
        text,
        mean_confidence,
    })
}

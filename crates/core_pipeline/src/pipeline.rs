//! Pipeline orchestrator
//!
//! Sequences acquire -> preprocess -> recognize -> parse for one capture at
//! a time and reports to a [`ResultSurface`]. State moves
//! `Idle -> Capturing -> (Succeeded | Failed) -> Idle`; requests that arrive
//! while a session is alive are ignored rather than queued.

use crate::error::ScanError;
use crate::ocr::{progress_channel, OcrAdapter, OcrBackend, RecognitionOptions, RecognitionProgress};
use crate::parser::parse_draws;
use crate::preprocess::{preprocess, PreprocessConfig};
use crate::source::{acquire_from_file, acquire_from_stream, FrameSource, SelectedFile};
use crate::types::{CaptureMode, RasterImage, RecognitionResult, ScanReport, SessionId, Status};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

/// Message shown for every failed capture
pub const FAILURE_MESSAGE: &str = "Failed to process image. Please try again.";

/// Display surface for status and results
pub trait ResultSurface: Send + Sync {
    fn status(&self, status: Status);

    fn render(&self, report: &ScanReport);
}

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Capturing,
    Succeeded,
    Failed,
}

/// Result of a capture request
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// A session was already running or no source was available
    Ignored,
    /// The pipeline ran and rendered this report
    Completed(ScanReport),
}

/// Configuration for the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub recognition: RecognitionOptions,
    /// How long the result status stays up before returning to ready
    pub reset_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            recognition: RecognitionOptions::default(),
            reset_delay: Duration::from_secs(2),
        }
    }
}

/// Build the report for a successful recognition
pub fn report_for(result: &RecognitionResult) -> ScanReport {
    let draws: Vec<_> = parse_draws(&result.text).collect();
    if !draws.is_empty() {
        ScanReport::Draws {
            draws,
            raw_text: result.text.clone(),
        }
    } else if result.is_blank() {
        ScanReport::NoTextFound
    } else {
        ScanReport::Unrecognized {
            raw_text: result.text.clone(),
        }
    }
}

#[derive(Debug)]
struct SessionState {
    state: Mutex<PipelineState>,
    started: AtomicUsize,
    resets: AtomicUsize,
}

impl SessionState {
    fn lock(&self) -> std::sync::MutexGuard<'_, PipelineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Keeps the pipeline out of `Idle` while any clone is alive
///
/// The capture task owns one clone and the blocking OCR task another, so an
/// aborted capture does not free the pipeline while the engine still runs.
#[derive(Debug)]
struct SessionLease {
    shared: Arc<SessionState>,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        *self.shared.lock() = PipelineState::Idle;
        self.shared.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Guard for the single active capture
///
/// Returns the pipeline to `Idle` exactly once, after the guard and every
/// hold taken from it are gone.
struct ScanSession {
    id: SessionId,
    started_at: Instant,
    lease: Arc<SessionLease>,
}

impl ScanSession {
    fn begin(shared: &Arc<SessionState>) -> Option<Self> {
        let mut state = shared.lock();
        if *state != PipelineState::Idle {
            return None;
        }
        *state = PipelineState::Capturing;
        shared.started.fetch_add(1, Ordering::SeqCst);
        Some(Self {
            id: SessionId::new(),
            started_at: Instant::now(),
            lease: Arc::new(SessionLease {
                shared: Arc::clone(shared),
            }),
        })
    }

    fn conclude(&self, state: PipelineState) {
        *self.lease.shared.lock() = state;
    }

    /// A hold that keeps this session alive past the guard
    fn hold(&self) -> Arc<SessionLease> {
        Arc::clone(&self.lease)
    }

    fn finish(self) {
        drop(self);
    }
}

/// Capture-to-result orchestrator
pub struct ScanPipeline<B: OcrBackend, S: ResultSurface> {
    config: PipelineConfig,
    ocr: OcrAdapter<B>,
    surface: S,
    shared: Arc<SessionState>,
}

impl<B: OcrBackend, S: ResultSurface> ScanPipeline<B, S> {
    pub fn new(config: PipelineConfig, backend: B, surface: S) -> Self {
        Self {
            config,
            ocr: OcrAdapter::new(backend),
            surface,
            shared: Arc::new(SessionState {
                state: Mutex::new(PipelineState::Idle),
                started: AtomicUsize::new(0),
                resets: AtomicUsize::new(0),
            }),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn backend(&self) -> &B {
        self.ocr.backend()
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.lock()
    }

    /// Number of sessions started so far
    pub fn sessions_started(&self) -> usize {
        self.shared.started.load(Ordering::SeqCst)
    }

    /// Number of returns to `Idle` so far
    pub fn resets(&self) -> usize {
        self.shared.resets.load(Ordering::SeqCst)
    }

    /// Capture the current frame of a live stream
    pub async fn capture_live(&self, source: &dyn FrameSource) -> CaptureOutcome {
        if !source.is_active() {
            debug!("Live capture ignored: no active stream");
            return CaptureOutcome::Ignored;
        }
        let Some(session) = ScanSession::begin(&self.shared) else {
            debug!("Live capture ignored: scan already in progress");
            return CaptureOutcome::Ignored;
        };
        info!(session = %session.id, "Live capture started");
        self.surface.status(Status::Processing);

        let result = match acquire_from_stream(source).await {
            Ok(raster) => self.process(raster, CaptureMode::Live, &session).await,
            Err(e) => Err(e),
        };
        self.complete(session, result).await
    }

    /// Process a photo delivered by the file picker
    pub async fn capture_still(&self, selection: Option<SelectedFile>) -> CaptureOutcome {
        let Some(file) = selection else {
            debug!("Still capture ignored: no file selected");
            return CaptureOutcome::Ignored;
        };
        let Some(session) = ScanSession::begin(&self.shared) else {
            debug!("Still capture ignored: scan already in progress");
            return CaptureOutcome::Ignored;
        };
        info!(session = %session.id, file = %file.name, "Still capture started");
        self.surface.status(Status::Processing);

        let result = match acquire_from_file(Some(&file)) {
            Ok(raster) => self.process(raster, CaptureMode::Still, &session).await,
            Err(e) => Err(e),
        };
        self.complete(session, result).await
    }

    async fn process(
        &self,
        raster: RasterImage,
        mode: CaptureMode,
        session: &ScanSession,
    ) -> Result<RecognitionResult, ScanError> {
        let processed = preprocess(&raster, mode, &self.config.preprocess)?;
        drop(raster);
        debug!(
            "Processed image {}x{}, {} bytes, sha256 {}",
            processed.width,
            processed.height,
            processed.bytes.len(),
            processed.fingerprint()
        );

        let (sink, progress) = progress_channel();
        let (result, ()) = tokio::join!(
            self.ocr.recognize_holding(
                &processed,
                &self.config.recognition,
                sink,
                session.hold()
            ),
            self.forward_progress(progress)
        );
        result
    }

    async fn forward_progress(&self, mut progress: UnboundedReceiver<RecognitionProgress>) {
        let mut last = None;
        while let Some(event) = progress.recv().await {
            let percent = (event.fraction * 100.0).round() as u8;
            if last != Some(percent) {
                last = Some(percent);
                self.surface.status(Status::Reading { percent });
            }
        }
    }

    async fn complete(
        &self,
        session: ScanSession,
        result: Result<RecognitionResult, ScanError>,
    ) -> CaptureOutcome {
        let report = match result {
            Ok(recognition) => {
                session.conclude(PipelineState::Succeeded);
                self.surface.status(Status::Done);
                report_for(&recognition)
            }
            Err(e) => {
                warn!(session = %session.id, step = e.step(), error = %e, "Scan failed");
                session.conclude(PipelineState::Failed);
                self.surface.status(Status::Failed);
                ScanReport::Failed {
                    message: FAILURE_MESSAGE.to_string(),
                }
            }
        };
        self.surface.render(&report);

        tokio::time::sleep(self.config.reset_delay).await;

        info!(
            session = %session.id,
            elapsed_ms = session.started_at.elapsed().as_millis() as u64,
            "{}",
            report.headline()
        );
        session.finish();
        self.surface.status(Status::Ready);

        CaptureOutcome::Completed(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::tests::{FailAt, FakeBackend};
    use crate::ocr::OcrSession;
    use crate::source::StillFrameSource;
    use crate::types::DrawKind;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::sync::mpsc::{self, Receiver, Sender};

    #[derive(Default)]
    struct RecordingSurface {
        statuses: Mutex<Vec<Status>>,
        reports: Mutex<Vec<ScanReport>>,
    }

    impl RecordingSurface {
        fn statuses(&self) -> Vec<Status> {
            self.statuses.lock().unwrap().clone()
        }

        fn reports(&self) -> Vec<ScanReport> {
            self.reports.lock().unwrap().clone()
        }
    }

    impl ResultSurface for RecordingSurface {
        fn status(&self, status: Status) {
            self.statuses.lock().unwrap().push(status);
        }

        fn render(&self, report: &ScanReport) {
            self.reports.lock().unwrap().push(report.clone());
        }
    }

    /// Backend whose recognition blocks until the test releases it
    struct GatedBackend {
        opened: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        release: Arc<Mutex<Receiver<()>>>,
    }

    struct GatedSession {
        live: Arc<AtomicUsize>,
        release: Arc<Mutex<Receiver<()>>>,
    }

    impl GatedBackend {
        fn new() -> (Self, Sender<()>) {
            let (tx, rx) = mpsc::channel();
            (
                Self {
                    opened: Arc::new(AtomicUsize::new(0)),
                    live: Arc::new(AtomicUsize::new(0)),
                    peak: Arc::new(AtomicUsize::new(0)),
                    release: Arc::new(Mutex::new(rx)),
                },
                tx,
            )
        }
    }

    impl OcrBackend for GatedBackend {
        type Session = GatedSession;

        fn open(&self, _language: &str) -> Result<GatedSession, ScanError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(live, Ordering::SeqCst);
            Ok(GatedSession {
                live: Arc::clone(&self.live),
                release: Arc::clone(&self.release),
            })
        }
    }

    impl Drop for GatedSession {
        fn drop(&mut self) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl OcrSession for GatedSession {
        fn set_whitelist(&mut self, _chars: &str) -> Result<(), ScanError> {
            Ok(())
        }

        fn set_page_seg_mode(&mut self, _mode: &str) -> Result<(), ScanError> {
            Ok(())
        }

        fn set_image(&mut self, _bytes: &[u8]) -> Result<(), ScanError> {
            Ok(())
        }

        fn text(&mut self) -> Result<String, ScanError> {
            let _ = self.release.lock().unwrap().recv();
            Ok("01 02 03 04 05".to_string())
        }

        fn mean_confidence(&mut self) -> Option<i32> {
            None
        }
    }

    fn quick_config() -> PipelineConfig {
        PipelineConfig {
            reset_delay: Duration::ZERO,
            ..PipelineConfig::default()
        }
    }

    fn frame() -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(320, 240, Rgb([240u8, 240u8, 240u8])))
    }

    fn png_file() -> SelectedFile {
        let mut bytes = Vec::new();
        frame()
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        SelectedFile::new("ticket.png", bytes)
    }

    async fn wait_for_state<B: OcrBackend, S: ResultSurface>(
        pipeline: &ScanPipeline<B, S>,
        state: PipelineState,
    ) {
        while pipeline.state() != state {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn test_live_capture_renders_draws() {
        let backend = FakeBackend::returning("LOTTO\nA 23 24 29 36 45 [06 09]\n12 34 56 78 90\n");
        let pipeline = ScanPipeline::new(quick_config(), backend, RecordingSurface::default());
        let source = StillFrameSource::new(frame());

        let outcome = pipeline.capture_live(&source).await;

        let (draws, raw_text) = match outcome {
            CaptureOutcome::Completed(ScanReport::Draws { draws, raw_text }) => (draws, raw_text),
            other => panic!("expected draws, got {:?}", other),
        };
        assert_eq!(draws.len(), 2);
        assert_eq!(draws[0].kind, DrawKind::BonusGroup);
        assert_eq!(draws[1].kind, DrawKind::NumberRun);
        assert!(raw_text.starts_with("LOTTO"));
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.surface().reports().len(), 1);
    }

    #[tokio::test]
    async fn test_status_sequence() {
        let pipeline = ScanPipeline::new(
            quick_config(),
            FakeBackend::returning("hello"),
            RecordingSurface::default(),
        );
        pipeline.capture_still(Some(png_file())).await;

        let statuses = pipeline.surface().statuses();
        assert_eq!(statuses.first(), Some(&Status::Processing));
        assert_eq!(statuses.last(), Some(&Status::Ready));
        assert!(statuses.contains(&Status::Done));
        assert!(statuses.contains(&Status::Reading { percent: 100 }));

        let percents: Vec<u8> = statuses
            .iter()
            .filter_map(|s| match s {
                Status::Reading { percent } => Some(*percent),
                _ => None,
            })
            .collect();
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_blank_text_renders_no_text_found() {
        let pipeline = ScanPipeline::new(
            quick_config(),
            FakeBackend::returning("  \n \n"),
            RecordingSurface::default(),
        );
        let outcome = pipeline.capture_still(Some(png_file())).await;
        assert_eq!(outcome, CaptureOutcome::Completed(ScanReport::NoTextFound));
    }

    #[tokio::test]
    async fn test_unrecognized_text_renders_raw_fallback() {
        let pipeline = ScanPipeline::new(
            quick_config(),
            FakeBackend::returning("hello world\n"),
            RecordingSurface::default(),
        );
        let outcome = pipeline.capture_still(Some(png_file())).await;
        assert_eq!(
            outcome,
            CaptureOutcome::Completed(ScanReport::Unrecognized {
                raw_text: "hello world\n".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_engine_failure_renders_generic_message() {
        let pipeline = ScanPipeline::new(
            quick_config(),
            FakeBackend::failing(FailAt::Open),
            RecordingSurface::default(),
        );
        let outcome = pipeline.capture_still(Some(png_file())).await;

        assert_eq!(
            outcome,
            CaptureOutcome::Completed(ScanReport::Failed {
                message: FAILURE_MESSAGE.to_string()
            })
        );
        assert!(pipeline.surface().statuses().contains(&Status::Failed));
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.resets(), 1);
    }

    #[tokio::test]
    async fn test_decode_failure_short_circuits() {
        let pipeline = ScanPipeline::new(
            quick_config(),
            FakeBackend::returning("12 34 56 78 90"),
            RecordingSurface::default(),
        );
        let outcome = pipeline
            .capture_still(Some(SelectedFile::new("bad.jpg", b"nope".to_vec())))
            .await;

        assert!(matches!(
            outcome,
            CaptureOutcome::Completed(ScanReport::Failed { .. })
        ));
        assert_eq!(pipeline.backend().opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_frame_fails_cleanly() {
        let pipeline = ScanPipeline::new(
            quick_config(),
            FakeBackend::returning("12 34 56 78 90"),
            RecordingSurface::default(),
        );
        let source = StillFrameSource::new(DynamicImage::new_rgb8(0, 0));
        let outcome = pipeline.capture_live(&source).await;

        assert!(matches!(
            outcome,
            CaptureOutcome::Completed(ScanReport::Failed { .. })
        ));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_no_source_is_a_no_op() {
        let pipeline = ScanPipeline::new(
            quick_config(),
            FakeBackend::returning(""),
            RecordingSurface::default(),
        );

        assert_eq!(
            pipeline.capture_live(&StillFrameSource::inactive()).await,
            CaptureOutcome::Ignored
        );
        assert_eq!(pipeline.capture_still(None).await, CaptureOutcome::Ignored);
        assert_eq!(pipeline.sessions_started(), 0);
        assert!(pipeline.surface().statuses().is_empty());
    }

    #[tokio::test]
    async fn test_second_capture_while_scanning_is_ignored() {
        let (backend, release) = GatedBackend::new();
        let opened = Arc::clone(&backend.opened);
        let pipeline = Arc::new(ScanPipeline::new(
            quick_config(),
            backend,
            RecordingSurface::default(),
        ));
        let source = Arc::new(StillFrameSource::new(frame()));

        let first = {
            let pipeline = Arc::clone(&pipeline);
            let source = Arc::clone(&source);
            tokio::spawn(async move { pipeline.capture_live(source.as_ref()).await })
        };
        wait_for_state(pipeline.as_ref(), PipelineState::Capturing).await;

        let second = pipeline.capture_live(source.as_ref()).await;
        assert_eq!(second, CaptureOutcome::Ignored);
        let third = pipeline.capture_still(Some(png_file())).await;
        assert_eq!(third, CaptureOutcome::Ignored);
        assert_eq!(pipeline.sessions_started(), 1);

        release.send(()).unwrap();
        let outcome = first.await.unwrap();
        assert!(matches!(
            outcome,
            CaptureOutcome::Completed(ScanReport::Draws { .. })
        ));
        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_returns_to_idle_once_after_delay() {
        let config = PipelineConfig {
            reset_delay: Duration::from_millis(100),
            ..PipelineConfig::default()
        };
        let pipeline = Arc::new(ScanPipeline::new(
            config,
            FakeBackend::returning("hello world"),
            RecordingSurface::default(),
        ));

        let task = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.capture_still(Some(png_file())).await })
        };
        wait_for_state(pipeline.as_ref(), PipelineState::Succeeded).await;

        // Still displaying the result: capture stays disabled
        assert_eq!(
            pipeline.capture_still(Some(png_file())).await,
            CaptureOutcome::Ignored
        );
        assert_eq!(pipeline.resets(), 0);

        task.await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.resets(), 1);
        let ready = pipeline
            .surface()
            .statuses()
            .iter()
            .filter(|s| **s == Status::Ready)
            .count();
        assert_eq!(ready, 1);
    }

    #[tokio::test]
    async fn test_aborted_capture_waits_for_engine_before_idle() {
        let (backend, release) = GatedBackend::new();
        let opened = Arc::clone(&backend.opened);
        let live = Arc::clone(&backend.live);
        let peak = Arc::clone(&backend.peak);
        let pipeline = Arc::new(ScanPipeline::new(
            quick_config(),
            backend,
            RecordingSurface::default(),
        ));
        let source = Arc::new(StillFrameSource::new(frame()));

        let task = {
            let pipeline = Arc::clone(&pipeline);
            let source = Arc::clone(&source);
            tokio::spawn(async move { pipeline.capture_live(source.as_ref()).await })
        };
        while opened.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        // The engine is still running: the pipeline must not accept work
        assert_eq!(live.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.state(), PipelineState::Capturing);
        assert_eq!(
            pipeline.capture_live(source.as_ref()).await,
            CaptureOutcome::Ignored
        );
        assert_eq!(pipeline.resets(), 0);

        release.send(()).unwrap();
        wait_for_state(pipeline.as_ref(), PipelineState::Idle).await;
        assert_eq!(live.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.resets(), 1);

        drop(release);
        let outcome = pipeline.capture_live(source.as_ref()).await;
        assert!(matches!(outcome, CaptureOutcome::Completed(_)));
        assert_eq!(pipeline.sessions_started(), 2);
        assert_eq!(pipeline.resets(), 2);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_capture_aborted_during_reset_delay_returns_to_idle() {
        let config = PipelineConfig {
            reset_delay: Duration::from_secs(60),
            ..PipelineConfig::default()
        };
        let pipeline = Arc::new(ScanPipeline::new(
            config,
            FakeBackend::returning("hello"),
            RecordingSurface::default(),
        ));

        let task = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.capture_still(Some(png_file())).await })
        };
        wait_for_state(pipeline.as_ref(), PipelineState::Succeeded).await;

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert_eq!(pipeline.resets(), 1);
    }

    #[test]
    fn test_report_for_prefers_draws() {
        let result = RecognitionResult {
            text: "noise\n01 02 03 04 05".to_string(),
            mean_confidence: None,
        };
        assert!(matches!(report_for(&result), ScanReport::Draws { .. }));
    }
}

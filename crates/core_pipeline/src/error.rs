//! Error taxonomy for the capture pipeline
//!
//! Every step reports its own failure kind. The orchestrator folds all of
//! them into a single "failed to process image" report for the user.

use thiserror::Error;

/// Errors raised by the individual pipeline steps
#[derive(Error, Debug)]
pub enum ScanError {
    /// No active camera stream, or the stream produced no frame
    #[error("Camera stream unavailable: {0}")]
    SourceUnavailable(String),

    /// The supplied photo could not be read or decoded
    #[error("Failed to decode image: {0}")]
    DecodeError(String),

    /// The file picker delivered no file
    #[error("No file selected")]
    NoFileSelected,

    /// Computed region of interest is degenerate (source not ready)
    #[error("Region of interest is empty ({width}x{height})")]
    EmptyRegion { width: u32, height: u32 },

    /// The OCR engine could not be constructed or configured
    #[error("Failed to initialize OCR engine: {0}")]
    EngineInitError(String),

    /// The OCR engine failed while recognizing
    #[error("Failed to recognize text: {0}")]
    RecognitionError(String),
}

impl ScanError {
    /// Name of the pipeline step that produced this error
    pub fn step(&self) -> &'static str {
        match self {
            ScanError::SourceUnavailable(_)
            | ScanError::DecodeError(_)
            | ScanError::NoFileSelected => "acquire",
            ScanError::EmptyRegion { .. } => "preprocess",
            ScanError::EngineInitError(_) | ScanError::RecognitionError(_) => "recognize",
        }
    }
}

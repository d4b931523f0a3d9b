//! Core pipeline for drawscan
//!
//! Turns a camera frame or a photo of a lottery ticket into classified
//! draw lines: acquire, preprocess, recognize with Tesseract, parse.
//!
//! Copyright (c) 2025 Michael A Wright

pub mod error;
pub mod ocr;
pub mod parser;
pub mod pipeline;
pub mod preprocess;
pub mod source;
pub mod types;

pub use error::ScanError;
pub use ocr::{CharsetProfile, OcrAdapter, OcrBackend, RecognitionOptions, TesseractBackend};
pub use pipeline::{CaptureOutcome, PipelineConfig, PipelineState, ResultSurface, ScanPipeline};
pub use types::*;

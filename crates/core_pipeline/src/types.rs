//! Core types for the drawscan pipeline
//!
//! These are the values handed from one pipeline step to the next:
//! raster in, processed JPEG, recognized text, classified draws, and the
//! report rendered at the end of a capture.

use base64::{engine::general_purpose, Engine as _};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Unique identifier for a capture-to-result cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// How the image was acquired, which selects crop and filter settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureMode {
    /// Frame grabbed from a live camera stream
    Live,
    /// Photo supplied by the user, already framed
    Still,
}

/// A decoded image buffer available for processing
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: DynamicImage,
}

impl RasterImage {
    pub fn new(image: DynamicImage) -> Self {
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_image(self) -> DynamicImage {
        self.image
    }
}

/// Sub-rectangle of a raster, in source pixel units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl RegionOfInterest {
    /// Region covering the whole source
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Centered region covering the given fractions of the source
    ///
    /// Fractions are clamped to `[0, 1]` so the region never leaves the
    /// source bounds.
    pub fn centered(width: u32, height: u32, width_fraction: f64, height_fraction: f64) -> Self {
        let w = (width as f64 * width_fraction.clamp(0.0, 1.0)).round() as u32;
        let h = (height as f64 * height_fraction.clamp(0.0, 1.0)).round() as u32;
        let w = w.min(width);
        let h = h.min(height);
        Self {
            x: (width - w) / 2,
            y: (height - h) / 2,
            width: w,
            height: h,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A transformed raster ready for OCR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImage {
    pub width: u32,
    pub height: u32,
    /// Encoded image bytes (see `mime_type`)
    pub bytes: Vec<u8>,
}

impl ProcessedImage {
    pub fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }

    /// Encode as a `data:` URI for display surfaces
    pub fn data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type(),
            general_purpose::STANDARD.encode(&self.bytes)
        )
    }

    /// SHA-256 of the encoded bytes as 64 hex characters
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Raw OCR output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// Full recognized text, lines separated by newlines
    pub text: String,
    /// Mean engine confidence (0-100), if reported
    pub mean_confidence: Option<i32>,
}

impl RecognitionResult {
    pub fn lines(&self) -> std::str::Lines<'_> {
        self.text.lines()
    }

    /// True when the engine produced nothing but whitespace
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Classification of a candidate ticket line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawKind {
    /// Line carrying a bracketed bonus-number group
    BonusGroup,
    /// Line with a run of short numbers
    NumberRun,
}

impl DrawKind {
    /// Display marker prefixed to the line
    pub fn marker(&self) -> &'static str {
        match self {
            DrawKind::BonusGroup => "⭐",
            DrawKind::NumberRun => "🎟️",
        }
    }
}

/// A classified candidate ticket line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDraw {
    /// Original line text as recognized
    pub line: String,
    pub kind: DrawKind,
    /// Marker plus trimmed line
    pub display: String,
}

/// Final result of a capture, handed to the rendering surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanReport {
    /// At least one draw was found
    Draws {
        draws: Vec<ParsedDraw>,
        raw_text: String,
    },
    /// OCR returned no text at all
    NoTextFound,
    /// Text was found but no line looked like a draw
    Unrecognized { raw_text: String },
    /// A pipeline step failed
    Failed { message: String },
}

impl ScanReport {
    /// Human-readable summary line
    pub fn headline(&self) -> String {
        match self {
            ScanReport::Draws { draws, .. } => format!("Found {} draw(s)", draws.len()),
            ScanReport::NoTextFound => "No text found. Try again with better lighting.".to_string(),
            ScanReport::Unrecognized { .. } => {
                "Layout not recognized. Raw text follows.".to_string()
            }
            ScanReport::Failed { message } => message.clone(),
        }
    }
}

/// Status line shown while the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ready,
    Processing,
    Reading { percent: u8 },
    Done,
    Failed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ready => write!(f, "Ready to scan"),
            Status::Processing => write!(f, "Processing image..."),
            Status::Reading { percent } => write!(f, "Reading text... {}%", percent),
            Status::Done => write!(f, "Done"),
            Status::Failed => write!(f, "Scan failed"),
        }
    }
}

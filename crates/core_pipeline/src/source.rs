//! Image source adapter
//!
//! Normalizes the two acquisition paths, a live camera frame and a photo
//! picked by the user, into a single [`RasterImage`].

use crate::error::ScanError;
use crate::types::RasterImage;
use async_trait::async_trait;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Camera stream provider
///
/// Start, stop and torch controls live outside the pipeline; it only reads
/// frames.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Whether a stream is currently running
    fn is_active(&self) -> bool;

    /// Current frame at native resolution, if one is available
    async fn current_frame(&self) -> Option<DynamicImage>;
}

/// Frame source that always serves the same image
///
/// Stands in for a camera when replaying photos from disk.
pub struct StillFrameSource {
    frame: Option<DynamicImage>,
}

impl StillFrameSource {
    pub fn new(frame: DynamicImage) -> Self {
        Self { frame: Some(frame) }
    }

    /// A source with no running stream
    pub fn inactive() -> Self {
        Self { frame: None }
    }
}

#[async_trait]
impl FrameSource for StillFrameSource {
    fn is_active(&self) -> bool {
        self.frame.is_some()
    }

    async fn current_frame(&self) -> Option<DynamicImage> {
        self.frame.clone()
    }
}

/// A file delivered by the file picker
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// Read a photo from disk
    pub fn from_path(path: &Path) -> Result<Self, ScanError> {
        let bytes = std::fs::read(path)
            .map_err(|e| ScanError::DecodeError(format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| PathBuf::from(path).display().to_string());
        Ok(Self { name, bytes })
    }
}

/// Grab the current frame of a live stream
pub async fn acquire_from_stream(source: &dyn FrameSource) -> Result<RasterImage, ScanError> {
    if !source.is_active() {
        return Err(ScanError::SourceUnavailable(
            "no active camera stream".to_string(),
        ));
    }

    let frame = source.current_frame().await.ok_or_else(|| {
        ScanError::SourceUnavailable("camera stream produced no frame".to_string())
    })?;

    debug!(
        "Acquired live frame {}x{}",
        frame.width(),
        frame.height()
    );
    Ok(RasterImage::new(frame))
}

/// Decode a user-supplied photo
///
/// The format is guessed from the bytes, so any format enabled in the
/// `image` crate is accepted.
pub fn acquire_from_file(selection: Option<&SelectedFile>) -> Result<RasterImage, ScanError> {
    let file = selection.ok_or(ScanError::NoFileSelected)?;

    if file.bytes.is_empty() {
        return Err(ScanError::DecodeError(format!("{}: file is empty", file.name)));
    }

    let image = image::load_from_memory(&file.bytes)
        .map_err(|e| ScanError::DecodeError(format!("{}: {}", file.name, e)))?;

    debug!(
        "Decoded {} ({} bytes) to {}x{}",
        file.name,
        file.bytes.len(),
        image.width(),
        image.height()
    );
    Ok(RasterImage::new(image))
}

//! Input discovery for batch scans

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use core_pipeline::source::{acquire_from_file, FrameSource, SelectedFile};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// File extensions treated as photos when walking a directory
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "gif", "tif", "tiff"];

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Resolve a file or directory argument to a sorted list of photos
///
/// A single file is returned as-is regardless of extension.
pub fn collect_images(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.exists() {
        bail!("Input not found: {}", input.display());
    }
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to read {}", input.display()))?;
        if entry.file_type().is_file() && is_image(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// Replays a photo from disk as the current camera frame
///
/// Decoding happens when the frame is read, so an unreadable photo fails
/// inside the capture like it does for a still.
pub struct PhotoFrame {
    file: SelectedFile,
}

impl PhotoFrame {
    pub fn new(file: SelectedFile) -> Self {
        Self { file }
    }
}

#[async_trait]
impl FrameSource for PhotoFrame {
    fn is_active(&self) -> bool {
        true
    }

    async fn current_frame(&self) -> Option<DynamicImage> {
        match acquire_from_file(Some(&self.file)) {
            Ok(raster) => Some(raster.into_image()),
            Err(e) => {
                warn!("No frame from {}: {}", self.file.name, e);
                None
            }
        }
    }
}

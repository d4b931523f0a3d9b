//! Image preprocessing module
//!
//! Prepares a captured raster for OCR of printed digits on paper:
//! - Cropping to the targeting band (live capture only)
//! - Grayscale conversion
//! - Contrast boost
//! - Brightness boost (live capture only)
//! - Maximum-quality JPEG encoding
//!
//! The transform is deterministic: identical input and parameters yield
//! byte-identical output.

use crate::error::ScanError;
use crate::types::{CaptureMode, ProcessedImage, RasterImage, RegionOfInterest};
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tone adjustments applied after desaturation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterParams {
    /// Contrast multiplier (1.0 = unchanged)
    pub contrast: f32,
    /// Brightness multiplier (1.0 = unchanged)
    pub brightness: f32,
}

impl FilterParams {
    /// Live camera frames are dimmer and noisier than framed photos
    pub const LIVE: FilterParams = FilterParams {
        contrast: 1.8,
        brightness: 1.2,
    };

    pub const STILL: FilterParams = FilterParams {
        contrast: 1.5,
        brightness: 1.0,
    };

    /// Lookup table mapping input luma to output luma
    ///
    /// Contrast pivots around mid-gray, then brightness scales.
    pub fn lookup_table(&self) -> [u8; 256] {
        let mut table = [0u8; 256];
        for (value, entry) in table.iter_mut().enumerate() {
            let v = value as f32;
            let v = ((v - 127.5) * self.contrast + 127.5).clamp(0.0, 255.0);
            let v = (v * self.brightness).clamp(0.0, 255.0);
            *entry = v.round() as u8;
        }
        table
    }
}

/// Fraction of the frame covered by the on-screen targeting box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionFraction {
    pub width: f64,
    pub height: f64,
}

impl Default for RegionFraction {
    fn default() -> Self {
        Self {
            width: 0.8,
            height: 0.3,
        }
    }
}

/// Configuration for the preprocessing step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Crop applied to live frames
    pub live_region: RegionFraction,
    pub live: FilterParams,
    pub still: FilterParams,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            live_region: RegionFraction::default(),
            live: FilterParams::LIVE,
            still: FilterParams::STILL,
            jpeg_quality: 100,
        }
    }
}

impl PreprocessConfig {
    pub fn filter_for(&self, mode: CaptureMode) -> FilterParams {
        match mode {
            CaptureMode::Live => self.live,
            CaptureMode::Still => self.still,
        }
    }
}

/// Region of the source that should be sent to OCR
pub fn region_for(image: &RasterImage, mode: CaptureMode, config: &PreprocessConfig) -> RegionOfInterest {
    match mode {
        CaptureMode::Live => RegionOfInterest::centered(
            image.width(),
            image.height(),
            config.live_region.width,
            config.live_region.height,
        ),
        CaptureMode::Still => RegionOfInterest::full(image.width(), image.height()),
    }
}

/// Crop to the region, desaturate and boost a raster
pub fn enhance(
    image: &RasterImage,
    region: RegionOfInterest,
    params: FilterParams,
) -> Result<GrayImage, ScanError> {
    if region.is_empty() {
        return Err(ScanError::EmptyRegion {
            width: region.width,
            height: region.height,
        });
    }

    let cropped = imageops::crop_imm(
        image.image(),
        region.x,
        region.y,
        region.width,
        region.height,
    )
    .to_image();
    let gray = imageops::grayscale(&cropped);

    let table = params.lookup_table();
    Ok(imageproc::map::map_colors(&gray, |p| Luma([table[p[0] as usize]])))
}

/// Encode a grayscale image as JPEG
pub fn encode_jpeg(image: &GrayImage, quality: u8) -> Result<Vec<u8>, ScanError> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
    image
        .write_with_encoder(encoder)
        .map_err(|e| ScanError::DecodeError(format!("Failed to encode JPEG: {}", e)))?;
    Ok(bytes)
}

/// Preprocess a captured image for OCR
pub fn preprocess(
    image: &RasterImage,
    mode: CaptureMode,
    config: &PreprocessConfig,
) -> Result<ProcessedImage, ScanError> {
    let region = region_for(image, mode, config);
    let params = config.filter_for(mode);

    debug!(
        "Preprocessing {:?} capture: source {}x{}, region {:?}, contrast {}, brightness {}",
        mode,
        image.width(),
        image.height(),
        region,
        params.contrast,
        params.brightness
    );

    let enhanced = enhance(image, region, params)?;
    let bytes = encode_jpeg(&enhanced, config.jpeg_quality)?;

    Ok(ProcessedImage {
        width: enhanced.width(),
        height: enhanced.height(),
        bytes,
    })
}

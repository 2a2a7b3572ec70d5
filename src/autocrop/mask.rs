//! Ignore mask: pixels that can never be part of the film.
//!
//! Glare and the light table show up either very bright or nearly
//! colorless. Both are excluded; what is left is the region the threshold
//! sweep may consider.

use super::denoise::{non_local_means, NlmConfig};
use super::CropError;
use crate::capture::{ConfigError, Frame};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::close;
use serde::{Deserialize, Serialize};

/// Mask value for pixels the sweep may use.
pub const CANDIDATE: u8 = 255;
/// Mask value for excluded pixels.
pub const EXCLUDED: u8 = 0;

/// Ignore-mask parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Equalized gray values above this are treated as glare.
    pub brightness_cutoff: u8,
    /// Blurred saturation at or below this is treated as background.
    pub saturation_ceiling: u8,
    /// Gaussian sigma applied to the saturation plane.
    pub blur_sigma: f32,
    /// Radius of the closing applied to the brightness mask.
    pub close_radius: u8,
    /// Denoising applied before equalization.
    pub denoise: NlmConfig,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            brightness_cutoff: 250,
            saturation_ceiling: 7,
            blur_sigma: 1.1,
            close_radius: 3,
            denoise: NlmConfig::default(),
        }
    }
}

impl MaskConfig {
    /// Checks that the thresholds and radii are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.blur_sigma > 0.0) {
            return Err(ConfigError::InvalidMask(format!(
                "blur_sigma must be positive (got {})",
                self.blur_sigma
            )));
        }
        if self.denoise.strength < 0.0 {
            return Err(ConfigError::InvalidMask(format!(
                "denoise strength must not be negative (got {})",
                self.denoise.strength
            )));
        }
        Ok(())
    }
}

/// Single-channel mask with the dimensions of its source frame.
///
/// [`CANDIDATE`] marks pixels that may belong to the film, [`EXCLUDED`]
/// marks background and glare.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    image: GrayImage,
}

impl Mask {
    /// Wraps a grayscale image; any non-zero value counts as candidate.
    pub fn from_image(image: GrayImage) -> Self {
        Self { image }
    }

    /// A mask that excludes nothing.
    pub fn all_candidate(rows: u32, cols: u32) -> Self {
        Self {
            image: GrayImage::from_pixel(cols, rows, Luma([CANDIDATE])),
        }
    }

    /// Mask height.
    pub fn rows(&self) -> u32 {
        self.image.height()
    }

    /// Mask width.
    pub fn cols(&self) -> u32 {
        self.image.width()
    }

    /// Whether the pixel at column `x`, row `y` may be film.
    pub fn is_candidate(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y)[0] != EXCLUDED
    }

    /// Number of candidate pixels.
    pub fn candidate_count(&self) -> usize {
        self.image.pixels().filter(|p| p[0] != EXCLUDED).count()
    }

    /// The underlying single-channel image.
    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }
}

/// Builds the ignore mask for `frame`.
pub fn build_ignore_mask(frame: &Frame, config: &MaskConfig) -> Result<Mask, CropError> {
    let rgb = frame
        .to_rgb_image()
        .ok_or_else(|| CropError::invalid_frame(frame))?;

    let bright = brightness_mask(&rgb, config);
    let colorless = saturation_mask(&rgb, config);

    let (cols, rows) = rgb.dimensions();
    let image = GrayImage::from_fn(cols, rows, |x, y| {
        let excluded = bright.get_pixel(x, y)[0] != 0 || colorless.get_pixel(x, y)[0] != 0;
        Luma([if excluded { EXCLUDED } else { CANDIDATE }])
    });

    let mask = Mask { image };
    tracing::debug!(
        rows,
        cols,
        candidates = mask.candidate_count(),
        "Built ignore mask"
    );
    Ok(mask)
}

/// Near-white pixels after denoising and equalization.
fn brightness_mask(rgb: &RgbImage, config: &MaskConfig) -> GrayImage {
    let gray = image::imageops::grayscale(rgb);
    let denoised = non_local_means(&gray, &config.denoise);
    let equalized = equalize_histogram(&denoised);
    let bright = binarize(&equalized, |v| v > config.brightness_cutoff);
    if config.close_radius == 0 {
        bright
    } else {
        close(&bright, Norm::LInf, config.close_radius)
    }
}

/// Nearly colorless pixels at any brightness.
fn saturation_mask(rgb: &RgbImage, config: &MaskConfig) -> GrayImage {
    let saturation = saturation_plane(rgb);
    let blurred = gaussian_blur_f32(&saturation, config.blur_sigma);
    binarize(&blurred, |v| v <= config.saturation_ceiling)
}

/// HSV saturation scaled to 0-255.
pub(crate) fn saturation_plane(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        if max == 0 {
            return Luma([0]);
        }
        let s = 255.0 * f32::from(max - min) / f32::from(max);
        Luma([s.round() as u8])
    })
}

/// Maps each pixel to 255 where `keep` holds and 0 elsewhere.
pub(crate) fn binarize(image: &GrayImage, keep: impl Fn(u8) -> bool) -> GrayImage {
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p[0] = if keep(p[0]) { 255 } else { 0 };
    }
    out
}

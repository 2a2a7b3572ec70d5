//! Automatic film detection and cropping.
//!
//! The pipeline runs in four stages:
//!
//! 1. [`build_ignore_mask`] marks glare and colorless background so they
//!    can never be taken for film.
//! 2. [`sweep`] thresholds the frame at every level of a fixed range and
//!    fits a rotated rectangle around the largest contour at each level.
//! 3. [`select_candidate`] keeps the rectangles whose size is plausible
//!    for a film frame and picks the tightest one.
//! 4. The chosen rectangle's bounding box, optionally trimmed, is cut out
//!    of the original frame.
//!
//! [`CropError::NoCropFound`] is an expected outcome; [`auto_crop_or_full`]
//! falls back to the uncropped frame.

mod denoise;
mod geometry;
mod mask;
mod select;
mod sweep;

pub use denoise::{non_local_means, NlmConfig};
pub use geometry::{min_area_rect, polygon_area, simplify_contour, RotatedRect};
pub use mask::{build_ignore_mask, Mask, MaskConfig, CANDIDATE, EXCLUDED};
pub use select::{crop_frame, select_candidate, CropRegion, SizeEnvelope};
pub use sweep::{candidate_at, sweep, CandidateRect, SweepConfig};

use crate::capture::{ConfigError, Frame};
use serde::{Deserialize, Serialize};

/// Errors from the crop pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CropError {
    /// No candidate fell inside the size envelope. Callers fall back to
    /// the uncropped frame.
    #[error("no crop candidate fits the size envelope")]
    NoCropFound,
    /// A region that does not fit the frame or is empty.
    #[error("invalid crop region: {0}")]
    InvalidRegion(String),
    /// Buffer length does not match `rows * cols * 3`.
    #[error("frame buffer of {len} bytes does not match {cols}x{rows}x3")]
    InvalidFrameDimensions {
        /// Frame height.
        rows: u32,
        /// Frame width.
        cols: u32,
        /// Actual buffer length.
        len: usize,
    },
}

impl CropError {
    pub(crate) fn invalid_frame(frame: &Frame) -> Self {
        CropError::InvalidFrameDimensions {
            rows: frame.rows(),
            cols: frame.cols(),
            len: frame.pixels().len(),
        }
    }
}

/// Auto-crop configuration, the `[crop]` section of the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CropConfig {
    /// Smallest admissible size as a fraction of the working frame.
    pub min_ratio: f64,
    /// Largest admissible size as a fraction of the working frame.
    pub max_ratio: f64,
    /// Fraction of the crop width removed from each of left and right.
    pub trim_horizontal: f64,
    /// Fraction of the crop height removed from each of top and bottom.
    pub trim_vertical: f64,
    /// Working frame width as a multiple of the row count.
    pub working_aspect: f64,
    /// Threshold range walked by the sweep.
    pub sweep: SweepConfig,
    /// Ignore-mask parameters.
    pub mask: MaskConfig,
}

impl Default for CropConfig {
    fn default() -> Self {
        Self {
            min_ratio: 0.6,
            max_ratio: 0.7,
            trim_horizontal: 0.0,
            trim_vertical: 0.0,
            working_aspect: 1.5,
            sweep: SweepConfig::default(),
            mask: MaskConfig::default(),
        }
    }
}

impl CropConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_ratio > 0.0 && self.min_ratio <= self.max_ratio && self.max_ratio <= 1.0) {
            return Err(ConfigError::InvalidCropRatio {
                min: self.min_ratio,
                max: self.max_ratio,
            });
        }
        for trim in [self.trim_horizontal, self.trim_vertical] {
            if !(0.0..0.5).contains(&trim) {
                return Err(ConfigError::InvalidTrim(trim));
            }
        }
        if !(self.working_aspect > 0.0) {
            return Err(ConfigError::InvalidAspect(self.working_aspect));
        }
        self.sweep.validate()?;
        self.mask.validate()
    }
}

/// A successful auto-crop.
#[derive(Debug, Clone)]
pub struct CropOutcome {
    /// The cropped pixels.
    pub frame: Frame,
    /// Where the crop sits in the source frame, after trimming.
    pub region: CropRegion,
    /// The rectangle that won selection.
    pub candidate: CandidateRect,
    /// How many candidates the size envelope admitted.
    pub admitted: usize,
}

/// Detects and crops the film in `frame`.
pub fn auto_crop(frame: &Frame, config: &CropConfig) -> Result<CropOutcome, CropError> {
    let mask = build_ignore_mask(frame, &config.mask)?;
    let candidates = sweep(frame, &mask, &config.sweep)?;
    select_and_crop(frame, &candidates, config)
}

/// Selection and cropping for an already swept frame.
pub fn select_and_crop(
    frame: &Frame,
    candidates: &[CandidateRect],
    config: &CropConfig,
) -> Result<CropOutcome, CropError> {
    let envelope = SizeEnvelope::for_rows(frame.rows(), config);
    let admitted = candidates.iter().filter(|c| envelope.admits(c)).count();
    let chosen = select_candidate(candidates, &envelope)?;

    let region = CropRegion::from_candidate(chosen, frame.rows(), frame.cols())?
        .trimmed(
            config.trim_horizontal,
            config.trim_vertical,
            (chosen.width, chosen.height),
        )?;
    let cropped = frame.region(&region)?;

    tracing::info!(
        threshold = chosen.threshold,
        x = region.x,
        y = region.y,
        width = region.width,
        height = region.height,
        admitted,
        "Auto-crop selected region"
    );

    Ok(CropOutcome {
        frame: cropped,
        region,
        candidate: chosen.clone(),
        admitted,
    })
}

/// What [`auto_crop_or_full`] kept.
#[derive(Debug, Clone)]
pub enum Cropped {
    /// Film was found and cropped out.
    Film(CropOutcome),
    /// No crop was found; the frame is unchanged.
    Full(Frame),
}

impl Cropped {
    /// Where the crop sits in the source frame, `None` on fallback.
    pub fn region(&self) -> Option<CropRegion> {
        match self {
            Cropped::Film(outcome) => Some(outcome.region),
            Cropped::Full(_) => None,
        }
    }

    /// Candidates the size envelope admitted, `None` on fallback.
    pub fn admitted(&self) -> Option<usize> {
        match self {
            Cropped::Film(outcome) => Some(outcome.admitted),
            Cropped::Full(_) => None,
        }
    }

    /// The kept frame and, when film was found, its region.
    pub fn into_parts(self) -> (Frame, Option<CropRegion>) {
        match self {
            Cropped::Film(outcome) => (outcome.frame, Some(outcome.region)),
            Cropped::Full(frame) => (frame, None),
        }
    }
}

/// Auto-crops `frame`, keeping it whole when no crop is found.
///
/// Errors other than [`CropError::NoCropFound`] are passed through.
pub fn auto_crop_or_full(frame: Frame, config: &CropConfig) -> Result<Cropped, CropError> {
    match auto_crop(&frame, config) {
        Ok(outcome) => Ok(Cropped::Film(outcome)),
        Err(CropError::NoCropFound) => {
            tracing::warn!(
                rows = frame.rows(),
                cols = frame.cols(),
                "No crop found, keeping the full frame"
            );
            Ok(Cropped::Full(frame))
        }
        Err(e) => Err(e),
    }
}

//! Threshold sweep and contour search.
//!
//! Film shows a crisp brightness edge against the light table at some
//! threshold, but which one depends on lighting. Every threshold in the
//! sweep is tried independently and yields at most one candidate: the
//! minimum-area rectangle around the largest external contour.

use super::geometry::{min_area_rect, polygon_area, simplify_contour};
use super::mask::{binarize, Mask};
use super::CropError;
use crate::capture::{ConfigError, Frame};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Threshold sweep parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// First threshold.
    pub start: u8,
    /// Last threshold (inclusive).
    pub end: u8,
    /// Step between thresholds.
    pub step: u8,
    /// Radius of the closing that bridges small gaps in each binary image.
    pub close_radius: u8,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start: 0,
            end: 250,
            step: 5,
            close_radius: 3,
        }
    }
}

impl SweepConfig {
    /// Rejects a zero step or an empty range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.step == 0 || self.start > self.end {
            return Err(ConfigError::InvalidSweep {
                start: self.start,
                end: self.end,
                step: self.step,
            });
        }
        Ok(())
    }

    /// Thresholds in ascending order.
    pub fn thresholds(&self) -> Vec<u8> {
        if self.step == 0 {
            return Vec::new();
        }
        (self.start..=self.end).step_by(self.step as usize).collect()
    }
}

/// Oriented rectangle found at one threshold.
///
/// `width` and `height` are pixel extents: a contour whose pixel centers
/// span columns 10 through 19 is 10 pixels wide.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRect {
    /// Threshold that produced this candidate.
    pub threshold: u8,
    /// Center `(x, y)` in frame pixels.
    pub center: (f64, f64),
    /// Extent along the side closer to horizontal.
    pub width: f64,
    /// Extent along the side closer to vertical.
    pub height: f64,
    /// Rotation in degrees, in `(-45, 45]`.
    pub angle: f64,
    /// Corner pixel centers.
    pub corners: [(f64, f64); 4],
    /// Area enclosed by the contour the rectangle was fitted to.
    pub contour_area: f64,
}

impl CandidateRect {
    /// `width * height`, the quantity the tie-break minimizes.
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Runs the full sweep over `frame`, restricted to `mask`.
///
/// Thresholds are processed in parallel; the result is always in
/// ascending threshold order.
pub fn sweep(
    frame: &Frame,
    mask: &Mask,
    config: &SweepConfig,
) -> Result<Vec<CandidateRect>, CropError> {
    let rgb = frame
        .to_rgb_image()
        .ok_or_else(|| CropError::invalid_frame(frame))?;
    if mask.rows() != frame.rows() || mask.cols() != frame.cols() {
        return Err(CropError::InvalidRegion(format!(
            "mask is {}x{} but frame is {}x{}",
            mask.cols(),
            mask.rows(),
            frame.cols(),
            frame.rows()
        )));
    }

    let gray = image::imageops::grayscale(&rgb);
    let candidates: Vec<CandidateRect> = config
        .thresholds()
        .par_iter()
        .filter_map(|&threshold| candidate_at(&gray, mask, threshold, config.close_radius))
        .collect();

    tracing::debug!(
        thresholds = config.thresholds().len(),
        candidates = candidates.len(),
        "Threshold sweep finished"
    );
    Ok(candidates)
}

/// Candidate for a single threshold, if any contour exists.
pub fn candidate_at(
    gray: &GrayImage,
    mask: &Mask,
    threshold: u8,
    close_radius: u8,
) -> Option<CandidateRect> {
    let mut binary = binarize(gray, |v| v > threshold);
    for (p, m) in binary.pixels_mut().zip(mask.as_image().pixels()) {
        if m[0] == 0 {
            p[0] = 0;
        }
    }
    if close_radius > 0 {
        binary = close(&binary, Norm::LInf, close_radius);
    }

    let largest = find_contours::<i32>(&binary)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| {
            let points = simplify_contour(&c.points);
            (polygon_area(&points), points)
        })
        .filter(|(area, _)| *area > 0.0)
        .max_by(|a, b| a.0.total_cmp(&b.0));

    let (contour_area, points) = largest?;
    let rect = min_area_rect(&points)?;

    tracing::trace!(
        threshold,
        width = rect.width + 1.0,
        height = rect.height + 1.0,
        angle = rect.angle,
        "Candidate found"
    );

    Some(CandidateRect {
        threshold,
        center: rect.center,
        width: rect.width + 1.0,
        height: rect.height + 1.0,
        angle: rect.angle,
        corners: rect.corners,
        contour_area,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autocrop::mask::build_ignore_mask;
    use crate::autocrop::tests::film_scene;
    use image::Luma;

    #[test]
    fn test_threshold_range() {
        let config = SweepConfig::default();
        let thresholds = config.thresholds();
        assert_eq!(thresholds.len(), 51);
        assert_eq!(thresholds[0], 0);
        assert_eq!(thresholds[50], 250);

        let zero_step = SweepConfig {
            step: 0,
            ..Default::default()
        };
        assert!(zero_step.thresholds().is_empty());
        assert!(matches!(
            zero_step.validate(),
            Err(ConfigError::InvalidSweep { .. })
        ));
    }

    #[test]
    fn test_single_threshold_finds_bright_block() {
        let gray = GrayImage::from_fn(60, 40, |x, y| {
            Luma([if (10..40).contains(&x) && (5..25).contains(&y) { 200 } else { 50 }])
        });
        let mask = Mask::all_candidate(40, 60);

        let candidate = candidate_at(&gray, &mask, 100, 0).unwrap();
        assert_eq!(candidate.threshold, 100);
        assert!((candidate.width - 30.0).abs() < 1e-6);
        assert!((candidate.height - 20.0).abs() < 1e-6);

        // Nothing is brighter than 200
        assert!(candidate_at(&gray, &mask, 200, 0).is_none());
    }

    #[test]
    fn test_largest_contour_wins() {
        let gray = GrayImage::from_fn(80, 40, |x, y| {
            let small = (5..15).contains(&x) && (5..15).contains(&y);
            let large = (30..70).contains(&x) && (5..35).contains(&y);
            Luma([if small || large { 255 } else { 0 }])
        });
        let mask = Mask::all_candidate(40, 80);

        let candidate = candidate_at(&gray, &mask, 128, 0).unwrap();
        assert!((candidate.width - 40.0).abs() < 1e-6);
        assert!((candidate.height - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_mask_restricts_contours() {
        let gray = GrayImage::from_pixel(50, 50, Luma([255]));
        let mask = Mask::from_image(GrayImage::from_fn(50, 50, |x, y| {
            Luma([if (10..20).contains(&x) && (10..30).contains(&y) { 255 } else { 0 }])
        }));

        let candidate = candidate_at(&gray, &mask, 0, 0).unwrap();
        assert!((candidate.width - 10.0).abs() < 1e-6);
        assert!((candidate.height - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_sweep_is_ordered_and_deterministic() {
        let frame = film_scene(150, 225, (60, 45, 100, 65));
        let mask = build_ignore_mask(&frame, &Default::default()).unwrap();
        let config = SweepConfig::default();

        let first = sweep(&frame, &mask, &config).unwrap();
        let second = sweep(&frame, &mask, &config).unwrap();
        assert!(!first.is_empty());
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0].threshold < w[1].threshold));
    }

    #[test]
    fn test_sweep_rejects_mismatched_mask() {
        let frame = Frame::filled(10, 10, [1, 2, 3]);
        let mask = Mask::all_candidate(5, 5);
        assert!(matches!(
            sweep(&frame, &mask, &SweepConfig::default()),
            Err(CropError::InvalidRegion(_))
        ));
    }
}

//! Candidate selection and cropping.

use super::sweep::CandidateRect;
use super::{CropConfig, CropError};
use crate::capture::Frame;
use serde::Serialize;

/// Axis-aligned region of a frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropRegion {
    /// Left edge, in pixels.
    pub x: u32,
    /// Top edge, in pixels.
    pub y: u32,
    /// Width, in pixels.
    pub width: u32,
    /// Height, in pixels.
    pub height: u32,
}

impl CropRegion {
    /// A region at `(x, y)`.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// The whole of a `rows` x `cols` frame.
    pub fn full(rows: u32, cols: u32) -> Self {
        Self::new(0, 0, cols, rows)
    }

    /// Bounding box of a candidate's corners, clipped to the frame.
    pub fn from_candidate(
        candidate: &CandidateRect,
        rows: u32,
        cols: u32,
    ) -> Result<Self, CropError> {
        let xs = candidate.corners.iter().map(|c| c.0);
        let ys = candidate.corners.iter().map(|c| c.1);
        let x0 = xs.clone().fold(f64::MAX, f64::min).floor();
        let x1 = xs.fold(f64::MIN, f64::max).ceil();
        let y0 = ys.clone().fold(f64::MAX, f64::min).floor();
        let y1 = ys.fold(f64::MIN, f64::max).ceil();

        clip(x0 as i64, y0 as i64, x1 as i64 + 1, y1 as i64 + 1, rows, cols)
    }

    /// Region from fractional coordinates in `[0, 1]`.
    ///
    /// A zero width or height extends the region to the far edge.
    pub fn from_normalized(
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        rows: u32,
        cols: u32,
    ) -> Result<Self, CropError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !(in_unit(x) && in_unit(y) && in_unit(width) && in_unit(height)) {
            return Err(CropError::InvalidRegion(format!(
                "normalized region ({}, {}, {}, {}) outside [0, 1]",
                x, y, width, height
            )));
        }

        let x0 = (x * cols as f64).floor() as i64;
        let y0 = (y * rows as f64).floor() as i64;
        let x1 = if width == 0.0 {
            cols as i64
        } else {
            x0 + (width * cols as f64).floor() as i64
        };
        let y1 = if height == 0.0 {
            rows as i64
        } else {
            y0 + (height * rows as f64).floor() as i64
        };

        clip(x0, y0, x1, y1, rows, cols)
    }

    /// Insets the region symmetrically.
    ///
    /// `floor(horizontal * basis.0)` pixels come off both the left and right
    /// edges and `floor(vertical * basis.1)` off the top and bottom. Auto-crop
    /// passes the selected rectangle's own width and height as the basis,
    /// not the size of its bounding box.
    pub fn trimmed(
        &self,
        horizontal: f64,
        vertical: f64,
        basis: (f64, f64),
    ) -> Result<Self, CropError> {
        let dx = (horizontal * basis.0).floor().max(0.0) as u32;
        let dy = (vertical * basis.1).floor().max(0.0) as u32;
        let width = self.width.saturating_sub(dx.saturating_mul(2));
        let height = self.height.saturating_sub(dy.saturating_mul(2));
        if width == 0 || height == 0 {
            return Err(CropError::InvalidRegion(format!(
                "trim ({}, {}) leaves nothing of {:?}",
                horizontal, vertical, self
            )));
        }
        Ok(Self::new(self.x + dx, self.y + dy, width, height))
    }

    /// Whether the region is non-empty and lies inside a `rows` x `cols` frame.
    pub fn fits(&self, rows: u32, cols: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= cols as u64
            && self.y as u64 + self.height as u64 <= rows as u64
    }
}

fn clip(x0: i64, y0: i64, x1: i64, y1: i64, rows: u32, cols: u32) -> Result<CropRegion, CropError> {
    let cx0 = x0.clamp(0, cols as i64);
    let cy0 = y0.clamp(0, rows as i64);
    let cx1 = x1.clamp(0, cols as i64);
    let cy1 = y1.clamp(0, rows as i64);
    if cx1 <= cx0 || cy1 <= cy0 {
        return Err(CropError::InvalidRegion(format!(
            "({}, {})..({}, {}) does not overlap the {}x{} frame",
            x0, y0, x1, y1, cols, rows
        )));
    }
    Ok(CropRegion::new(
        cx0 as u32,
        cy0 as u32,
        (cx1 - cx0) as u32,
        (cy1 - cy0) as u32,
    ))
}

/// Admissible candidate sizes for one frame.
///
/// The working frame is `rows` high and `working_aspect * rows` wide. A
/// candidate's width must lie within `[min_ratio, max_ratio]` of the
/// working width and its height within the same ratios of the working
/// height; both are checked independently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizeEnvelope {
    /// Smallest admitted width.
    pub min_width: f64,
    /// Largest admitted width.
    pub max_width: f64,
    /// Smallest admitted height.
    pub min_height: f64,
    /// Largest admitted height.
    pub max_height: f64,
}

impl SizeEnvelope {
    /// Envelope for a frame with `rows` rows.
    pub fn for_rows(rows: u32, config: &CropConfig) -> Self {
        let working_height = rows as f64;
        let working_width = (config.working_aspect * working_height).floor();
        Self {
            min_width: (config.min_ratio * working_width).floor(),
            max_width: (config.max_ratio * working_width).floor(),
            min_height: (config.min_ratio * working_height).floor(),
            max_height: (config.max_ratio * working_height).floor(),
        }
    }

    /// Whether both sides of `candidate` are within bounds, inclusive.
    pub fn admits(&self, candidate: &CandidateRect) -> bool {
        (self.min_width..=self.max_width).contains(&candidate.width)
            && (self.min_height..=self.max_height).contains(&candidate.height)
    }
}

/// Picks the candidate to crop to.
///
/// Among candidates the envelope admits, the one with the smallest
/// `width * height` wins; equal areas go to the lowest threshold, so the
/// choice never depends on the order candidates arrive in.
pub fn select_candidate<'a>(
    candidates: &'a [CandidateRect],
    envelope: &SizeEnvelope,
) -> Result<&'a CandidateRect, CropError> {
    candidates
        .iter()
        .filter(|c| envelope.admits(c))
        .min_by(|a, b| {
            a.area()
                .total_cmp(&b.area())
                .then(a.threshold.cmp(&b.threshold))
        })
        .ok_or(CropError::NoCropFound)
}

/// Copies `region` out of `frame`.
pub fn crop_frame(frame: &Frame, region: &CropRegion) -> Result<Frame, CropError> {
    frame.region(region)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(threshold: u8, x: f64, y: f64, width: f64, height: f64) -> CandidateRect {
        let (x1, y1) = (x + width - 1.0, y + height - 1.0);
        CandidateRect {
            threshold,
            center: ((x + x1) / 2.0, (y + y1) / 2.0),
            width,
            height,
            angle: 0.0,
            corners: [(x, y), (x1, y), (x1, y1), (x, y1)],
            contour_area: (width - 1.0) * (height - 1.0),
        }
    }

    fn envelope(min: f64, max: f64) -> SizeEnvelope {
        SizeEnvelope::for_rows(
            600,
            &CropConfig {
                min_ratio: min,
                max_ratio: max,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_envelope_bounds() {
        let env = envelope(0.3, 0.95);
        assert_eq!(env.min_width, 270.0);
        assert_eq!(env.max_width, 855.0);
        assert_eq!(env.min_height, 180.0);
        assert_eq!(env.max_height, 570.0);
    }

    #[test]
    fn test_smallest_admitted_candidate_wins() {
        let candidates = vec![
            candidate(10, 240.0, 160.0, 420.0, 280.0),
            candidate(20, 250.0, 170.0, 400.0, 260.0),
            candidate(30, 0.0, 0.0, 100.0, 100.0),
        ];
        let chosen = select_candidate(&candidates, &envelope(0.3, 0.95)).unwrap();
        assert_eq!(chosen.threshold, 20);
    }

    #[test]
    fn test_equal_area_goes_to_lowest_threshold() {
        let candidates = vec![
            candidate(40, 250.0, 170.0, 400.0, 260.0),
            candidate(15, 252.0, 171.0, 400.0, 260.0),
        ];
        let chosen = select_candidate(&candidates, &envelope(0.3, 0.95)).unwrap();
        assert_eq!(chosen.threshold, 15);
    }

    #[test]
    fn test_nothing_admitted() {
        let candidates = vec![candidate(10, 250.0, 170.0, 400.0, 260.0)];
        assert!(matches!(
            select_candidate(&candidates, &envelope(0.9, 0.95)),
            Err(CropError::NoCropFound)
        ));
        assert!(matches!(
            select_candidate(&[], &envelope(0.3, 0.95)),
            Err(CropError::NoCropFound)
        ));
    }

    #[test]
    fn test_region_from_candidate() {
        let c = candidate(10, 250.0, 170.0, 400.0, 260.0);
        let region = CropRegion::from_candidate(&c, 600, 900).unwrap();
        assert_eq!(region, CropRegion::new(250, 170, 400, 260));
    }

    #[test]
    fn test_region_clipped_to_frame() {
        let c = candidate(10, -20.0, 500.0, 100.0, 200.0);
        let region = CropRegion::from_candidate(&c, 600, 900).unwrap();
        assert_eq!(region, CropRegion::new(0, 500, 80, 100));

        let outside = candidate(10, 1000.0, 0.0, 50.0, 50.0);
        assert!(matches!(
            CropRegion::from_candidate(&outside, 600, 900),
            Err(CropError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_trim_uses_floor_of_basis() {
        let region = CropRegion::new(10, 20, 405, 263);
        let trimmed = region.trimmed(0.1, 0.1, (405.0, 263.0)).unwrap();
        assert_eq!(trimmed.width, 405 - 2 * 40);
        assert_eq!(trimmed.height, 263 - 2 * 26);
        assert_eq!(trimmed.x, 50);
        assert_eq!(trimmed.y, 46);

        // A rotated rectangle is narrower than its bounding box
        let trimmed = region.trimmed(0.1, 0.0, (300.0, 200.0)).unwrap();
        assert_eq!(trimmed.x, 40);
        assert_eq!(trimmed.width, 405 - 2 * 30);
        assert_eq!(trimmed.height, 263);

        assert_eq!(region.trimmed(0.0, 0.0, (405.0, 263.0)).unwrap(), region);
        assert!(matches!(
            region.trimmed(0.4, 0.0, (1000.0, 263.0)),
            Err(CropError::InvalidRegion(_))
        ));
    }

    #[test]
    fn test_normalized_region() {
        let region = CropRegion::from_normalized(0.1, 0.2, 0.5, 0.5, 600, 900).unwrap();
        assert_eq!(region, CropRegion::new(90, 120, 450, 300));

        // Zero size runs to the far edge
        let region = CropRegion::from_normalized(0.5, 0.5, 0.0, 0.0, 600, 900).unwrap();
        assert_eq!(region, CropRegion::new(450, 300, 450, 300));

        assert!(CropRegion::from_normalized(1.5, 0.0, 0.0, 0.0, 600, 900).is_err());
    }

    #[test]
    fn test_crop_frame_bounds() {
        let frame = Frame::filled(10, 20, [1, 2, 3]);
        let cropped = crop_frame(&frame, &CropRegion::new(5, 2, 10, 6)).unwrap();
        assert_eq!(cropped.cols(), 10);
        assert_eq!(cropped.rows(), 6);

        assert!(matches!(
            crop_frame(&frame, &CropRegion::new(15, 0, 10, 5)),
            Err(CropError::InvalidRegion(_))
        ));
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_trim_width_formula(w in 1u32..4000, h in 1u32..4000) {
            let region = CropRegion::new(0, 0, w, h);
            let trimmed = region.trimmed(0.1, 0.1, (w as f64, h as f64)).unwrap();
            prop_assert_eq!(trimmed.width, w - 2 * (0.1 * w as f64).floor() as u32);
            prop_assert_eq!(trimmed.height, h - 2 * (0.1 * h as f64).floor() as u32);
        }
    }
}

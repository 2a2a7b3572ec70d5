//! Developing stills: negative inversion and simple white balance.

use crate::capture::{Frame, CHANNELS};
use rayon::prelude::*;

/// Fraction of pixels clipped at each end of a channel by [`white_balance`].
pub const WHITE_BALANCE_TAIL: f64 = 0.005;

/// Inverts every channel, turning a negative into a positive.
pub fn invert(frame: &mut Frame) {
    frame.pixels_mut().par_iter_mut().for_each(|v| *v = 255 - *v);
}

/// Per-channel levels of one channel: values at or below `low` map to 0,
/// values at or above `high` to 255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Levels {
    /// Input value mapped to 0.
    pub low: u8,
    /// Input value mapped to 255.
    pub high: u8,
}

impl Levels {
    /// Levels that clip `tail` of the pixels at each end of `histogram`.
    ///
    /// Returns `None` when the channel has no usable range.
    pub fn from_histogram(histogram: &[u64; 256], tail: f64) -> Option<Self> {
        let total: u64 = histogram.iter().sum();
        if total == 0 {
            return None;
        }
        let clip = (total as f64 * tail).floor() as u64;

        let mut seen = 0;
        let low = histogram.iter().position(|&count| {
            seen += count;
            seen > clip
        })?;
        let mut seen = 0;
        let high = 255 - histogram.iter().rev().position(|&count| {
            seen += count;
            seen > clip
        })?;

        (high > low).then_some(Self {
            low: low as u8,
            high: high as u8,
        })
    }

    /// Stretches `v` linearly from `low..=high` onto `0..=255`.
    pub fn apply(&self, v: u8) -> u8 {
        let span = (self.high.saturating_sub(self.low) as u32).max(1);
        let shifted = v.saturating_sub(self.low) as u32;
        ((shifted * 255 + span / 2) / span).min(255) as u8
    }
}

/// Stretches each channel so its `WHITE_BALANCE_TAIL` percentiles map to
/// black and white. Channels with no range are left alone.
pub fn white_balance(frame: &mut Frame) {
    if !frame.is_valid() {
        tracing::warn!(?frame, "Skipping white balance of invalid frame");
        return;
    }

    let mut histograms = [[0u64; 256]; CHANNELS];
    for pixel in frame.pixels().chunks_exact(CHANNELS) {
        for (c, &v) in pixel.iter().enumerate() {
            histograms[c][v as usize] += 1;
        }
    }

    let levels: Vec<Option<Levels>> = histograms
        .iter()
        .map(|h| Levels::from_histogram(h, WHITE_BALANCE_TAIL))
        .collect();
    tracing::debug!(?levels, "White balance levels");

    frame
        .pixels_mut()
        .par_chunks_exact_mut(CHANNELS)
        .for_each(|pixel| {
            for (v, level) in pixel.iter_mut().zip(&levels) {
                if let Some(level) = level {
                    *v = level.apply(*v);
                }
            }
        });
}

//! Preview and cache encoding: JPEG output, downscaling, MJPEG framing.

mod mjpeg;

pub use mjpeg::{content_type, part, part_header, BOUNDARY};

use crate::capture::Frame;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};

/// Preview encoding errors.
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// Buffer length does not match `rows * cols * 3`.
    #[error("invalid frame dimensions: {cols}x{rows} with {len} bytes")]
    InvalidFrameDimensions {
        /// Frame height.
        rows: u32,
        /// Frame width.
        cols: u32,
        /// Actual buffer length.
        len: usize,
    },
    /// The JPEG encoder failed.
    #[error("JPEG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

impl PreviewError {
    fn invalid_frame(frame: &Frame) -> Self {
        PreviewError::InvalidFrameDimensions {
            rows: frame.rows(),
            cols: frame.cols(),
            len: frame.pixels().len(),
        }
    }
}

/// Encodes a frame as JPEG at the given quality (1-100).
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, PreviewError> {
    let rgb = frame
        .to_rgb_image()
        .ok_or_else(|| PreviewError::invalid_frame(frame))?;

    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    encoder.encode_image(&rgb)?;
    Ok(jpeg)
}

/// Shrinks a frame by `scale`; a scale of 1 or more returns a copy.
///
/// Neither dimension drops below one pixel.
pub fn downscale(frame: &Frame, scale: f32) -> Result<Frame, PreviewError> {
    let rgb = frame
        .to_rgb_image()
        .ok_or_else(|| PreviewError::invalid_frame(frame))?;
    if scale >= 1.0 || scale <= 0.0 {
        return Ok(Frame::from_rgb_image(rgb, frame.sequence()));
    }

    let cols = ((frame.cols() as f32 * scale).round() as u32).max(1);
    let rows = ((frame.rows() as f32 * scale).round() as u32).max(1);
    let resized = imageops::resize(&rgb, cols, rows, FilterType::Triangle);
    Ok(Frame::from_rgb_image(resized, frame.sequence()))
}

/// Downscaled JPEG for the live preview.
pub fn preview_jpeg(frame: &Frame, scale: f32, quality: u8) -> Result<Vec<u8>, PreviewError> {
    encode_jpeg(&downscale(frame, scale)?, quality)
}

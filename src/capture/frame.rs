//! Frame type representing a captured image with metadata.

use crate::autocrop::{CropError, CropRegion};
use image::RgbImage;
use std::time::Instant;

/// Number of interleaved bytes per pixel.
pub const CHANNELS: usize = 3;

/// Byte order of the three interleaved color channels.
///
/// Capture devices commonly hand out BGR while encoders and the
/// `image` crate expect RGB. Conversions are always explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
    /// Red, green, blue (display order).
    #[default]
    Rgb,
    /// Blue, green, red (common capture order).
    Bgr,
}

/// A single captured frame from the camera.
///
/// Pixels are row-major, 3 bytes per pixel, one byte per channel.
/// The buffer is expected to hold exactly `rows * cols * 3` bytes;
/// [`Frame::is_valid`] checks that invariant.
#[derive(Clone)]
pub struct Frame {
    /// Raw interleaved pixel data.
    pixels: Vec<u8>,
    /// Number of pixel rows (image height).
    rows: u32,
    /// Number of pixel columns (image width).
    cols: u32,
    /// Channel order of `pixels`.
    order: ChannelOrder,
    /// Capture timestamp.
    timestamp: Instant,
    /// Monotonic sequence number.
    sequence: u64,
}

impl Frame {
    /// Creates a new RGB frame with the given parameters.
    pub fn new(pixels: Vec<u8>, rows: u32, cols: u32, sequence: u64) -> Self {
        Self::with_order(pixels, rows, cols, ChannelOrder::Rgb, sequence)
    }

    /// Creates a new frame whose pixels are in the given channel order.
    pub fn with_order(
        pixels: Vec<u8>,
        rows: u32,
        cols: u32,
        order: ChannelOrder,
        sequence: u64,
    ) -> Self {
        Self {
            pixels,
            rows,
            cols,
            order,
            timestamp: Instant::now(),
            sequence,
        }
    }

    /// Creates a frame filled with a single RGB color.
    pub fn filled(rows: u32, cols: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(rows as usize * cols as usize * CHANNELS)
            .collect();
        Self::new(pixels, rows, cols, 0)
    }

    /// Wraps an `image` crate RGB buffer.
    pub fn from_rgb_image(image: RgbImage, sequence: u64) -> Self {
        let (cols, rows) = image.dimensions();
        Self::new(image.into_raw(), rows, cols, sequence)
    }

    /// Returns a reference to the raw pixel data.
    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Returns a mutable reference to the raw pixel data.
    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Consumes the frame and returns its pixel buffer.
    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Returns the number of rows.
    #[inline]
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Returns the number of columns.
    #[inline]
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Returns the channel order of the pixel buffer.
    #[inline]
    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the total number of pixels (rows * cols).
    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.rows as usize) * (self.cols as usize)
    }

    /// Returns the number of bytes the buffer must hold.
    #[inline]
    pub fn expected_len(&self) -> usize {
        self.pixel_count() * CHANNELS
    }

    /// Validates that the frame is non-empty and the buffer size matches dimensions.
    pub fn is_valid(&self) -> bool {
        self.rows > 0 && self.cols > 0 && self.pixels.len() == self.expected_len()
    }

    /// Returns a copy of this frame with its channels rearranged into `order`.
    pub fn to_order(&self, order: ChannelOrder) -> Frame {
        let mut converted = self.clone();
        if self.order != order {
            for pixel in converted.pixels.chunks_exact_mut(CHANNELS) {
                pixel.swap(0, 2);
            }
            converted.order = order;
        }
        converted
    }

    /// Converts to an `image` crate RGB buffer, normalizing channel order.
    ///
    /// Returns `None` if the frame is not valid.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        if !self.is_valid() {
            return None;
        }
        let rgb = self.to_order(ChannelOrder::Rgb);
        RgbImage::from_raw(self.cols, self.rows, rgb.pixels)
    }

    /// Copies `region` out of the frame.
    ///
    /// Fails with [`CropError::InvalidRegion`] unless the region is
    /// non-empty and lies entirely inside the frame.
    pub fn region(&self, region: &CropRegion) -> Result<Frame, CropError> {
        if !self.is_valid() {
            return Err(CropError::invalid_frame(self));
        }
        if !region.fits(self.rows, self.cols) {
            return Err(CropError::InvalidRegion(format!(
                "{:?} does not fit the {}x{} frame",
                region, self.cols, self.rows
            )));
        }
        Ok(self.sub_frame(region.x, region.y, region.width, region.height))
    }

    /// Copies out the rectangle `x..x+width`, `y..y+height`.
    ///
    /// The caller guarantees the rectangle lies inside the frame.
    fn sub_frame(&self, x: u32, y: u32, width: u32, height: u32) -> Frame {
        let row_bytes = self.cols as usize * CHANNELS;
        let mut pixels = Vec::with_capacity(width as usize * height as usize * CHANNELS);
        for row in y..y + height {
            let start = row as usize * row_bytes + x as usize * CHANNELS;
            let end = start + width as usize * CHANNELS;
            pixels.extend_from_slice(&self.pixels[start..end]);
        }
        Frame {
            pixels,
            rows: height,
            cols: width,
            order: self.order,
            timestamp: self.timestamp,
            sequence: self.sequence,
        }
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("order", &self.order)
            .field("sequence", &self.sequence)
            .field("pixel_bytes", &self.pixels.len())
            .finish()
    }
}

//! Minimal baseline TIFF encoder.
//!
//! Produces uncompressed 8-bit RGB images with a single strip and a single
//! image file directory. Output is fully deterministic: the same frame and
//! options always yield the same bytes.
//!
//! Layout:
//!
//! ```text
//! header (8) | directory (2 + 12n + 4) | deferred values in field order
//! ```

mod directory;
mod header;

pub use directory::{tag, Directory, Field, FieldType, Value, ENTRY_LEN};
pub use header::{ByteOrder, Header, HEADER_LEN, MAGIC};

use crate::capture::{ChannelOrder, Frame, CHANNELS};
use std::borrow::Cow;

/// TIFF encoding errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TiffError {
    /// Buffer length does not match `rows * cols * 3`, or a dimension is 0.
    #[error("invalid frame dimensions: {cols}x{rows} with {len} bytes")]
    InvalidFrameDimensions {
        /// Frame height.
        rows: u32,
        /// Frame width.
        cols: u32,
        /// Actual buffer length.
        len: usize,
    },
    /// The file would not be addressable with 32-bit offsets.
    #[error("image too large for a TIFF file ({0} bytes)")]
    TooLarge(u64),
    /// Two fields share a tag.
    #[error("duplicate TIFF tag {0}")]
    DuplicateTag(u16),
}

/// Resolution units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ResolutionUnit {
    /// No absolute unit; only the aspect ratio is meaningful.
    None = 1,
    /// Dots per inch.
    Inch = 2,
    /// Dots per centimeter.
    Centimeter = 3,
}

/// Physical resolution stored with the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// Horizontal pixels per unit, as numerator/denominator.
    pub x: (u32, u32),
    /// Vertical pixels per unit, as numerator/denominator.
    pub y: (u32, u32),
    /// Unit of `x` and `y`.
    pub unit: ResolutionUnit,
}

impl Resolution {
    /// Same whole-number resolution on both axes, per inch.
    pub fn dpi(dpi: u32) -> Self {
        Self {
            x: (dpi, 1),
            y: (dpi, 1),
            unit: ResolutionUnit::Inch,
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::dpi(72)
    }
}

/// Encoder options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffOptions {
    /// Byte order of the file.
    pub byte_order: ByteOrder,
    /// Resolution fields are omitted when `None`.
    pub resolution: Option<Resolution>,
}

impl Default for TiffOptions {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::LittleEndian,
            resolution: Some(Resolution::default()),
        }
    }
}

/// Encodes a frame as an RGB TIFF.
///
/// BGR frames are converted to RGB first.
pub fn encode_tiff(frame: &Frame, options: &TiffOptions) -> Result<Vec<u8>, TiffError> {
    let pixels: Cow<'_, [u8]> = match frame.order() {
        ChannelOrder::Rgb => Cow::Borrowed(frame.pixels()),
        ChannelOrder::Bgr => Cow::Owned(frame.to_order(ChannelOrder::Rgb).into_pixels()),
    };
    encode_rgb(&pixels, frame.rows(), frame.cols(), options)
}

/// Encodes an interleaved RGB buffer of `rows` x `cols` pixels.
pub fn encode_rgb(
    pixels: &[u8],
    rows: u32,
    cols: u32,
    options: &TiffOptions,
) -> Result<Vec<u8>, TiffError> {
    let expected = rows as u64 * cols as u64 * CHANNELS as u64;
    if rows == 0 || cols == 0 || pixels.len() as u64 != expected {
        return Err(TiffError::InvalidFrameDimensions {
            rows,
            cols,
            len: pixels.len(),
        });
    }
    let strip_len = u32::try_from(expected).map_err(|_| TiffError::TooLarge(expected))?;

    let directory = Directory::new(rgb_fields(pixels, rows, cols, strip_len, options))?;
    let header = Header::new(options.byte_order);

    let capacity = HEADER_LEN as usize + directory.len() as usize + pixels.len() + 32;
    let mut out = Vec::with_capacity(capacity);
    out.extend_from_slice(&header.encode());
    out.extend(directory.encode(options.byte_order, header.first_ifd)?);

    tracing::debug!(rows, cols, bytes = out.len(), "Encoded TIFF");
    Ok(out)
}

fn rgb_fields<'a>(
    pixels: &'a [u8],
    rows: u32,
    cols: u32,
    strip_len: u32,
    options: &TiffOptions,
) -> Vec<Field<'a>> {
    let mut fields = vec![
        Field::long(tag::IMAGE_WIDTH, cols),
        Field::long(tag::IMAGE_LENGTH, rows),
        Field::new(tag::BITS_PER_SAMPLE, Value::Short(vec![8; CHANNELS])),
        // No compression
        Field::short(tag::COMPRESSION, 1),
        // RGB
        Field::short(tag::PHOTOMETRIC_INTERPRETATION, 2),
        Field::new(tag::STRIP_OFFSETS, Value::DataOffset(pixels)),
        Field::short(tag::SAMPLES_PER_PIXEL, CHANNELS as u16),
        Field::long(tag::ROWS_PER_STRIP, rows),
        Field::long(tag::STRIP_BYTE_COUNTS, strip_len),
        // Chunky
        Field::short(tag::PLANAR_CONFIGURATION, 1),
    ];
    if let Some(res) = options.resolution {
        fields.push(Field::new(tag::X_RESOLUTION, Value::Rational(vec![res.x])));
        fields.push(Field::new(tag::Y_RESOLUTION, Value::Rational(vec![res.y])));
        fields.push(Field::short(tag::RESOLUTION_UNIT, res.unit as u16));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Reads one directory entry of a little- or big-endian file.
    fn entry(bytes: &[u8], index: usize) -> (u16, u16, u32, [u8; 4]) {
        let order = if &bytes[..2] == b"II" {
            ByteOrder::LittleEndian
        } else {
            ByteOrder::BigEndian
        };
        let ifd = order.read_u32([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let at = ifd + 2 + index * ENTRY_LEN as usize;
        let b = &bytes[at..at + 12];
        (
            order.read_u16([b[0], b[1]]),
            order.read_u16([b[2], b[3]]),
            order.read_u32([b[4], b[5], b[6], b[7]]),
            [b[8], b[9], b[10], b[11]],
        )
    }

    fn entry_count(bytes: &[u8]) -> usize {
        u16::from_le_bytes([bytes[8], bytes[9]]) as usize
    }

    fn gradient(rows: u32, cols: u32) -> Frame {
        let pixels = (0..rows * cols * 3).map(|i| (i * 7 % 251) as u8).collect();
        Frame::new(pixels, rows, cols, 0)
    }

    #[test]
    fn test_layout_of_small_image() {
        let frame = gradient(2, 3);
        let bytes = encode_tiff(&frame, &TiffOptions::default()).unwrap();

        assert_eq!(&bytes[..8], &[b'I', b'I', 42, 0, 8, 0, 0, 0]);
        assert_eq!(entry_count(&bytes), 13);

        let tags: Vec<u16> = (0..13).map(|i| entry(&bytes, i).0).collect();
        assert_eq!(
            tags,
            vec![256, 257, 258, 259, 262, 273, 277, 278, 279, 282, 283, 284, 296]
        );
        assert!(tags.windows(2).all(|w| w[0] < w[1]));

        // Directory is 2 + 13 * 12 + 4 = 162 bytes, deferred data starts at 170
        let (_, ty, count, slot) = entry(&bytes, 2);
        assert_eq!((ty, count), (3, 3));
        assert_eq!(u32::from_le_bytes(slot), 170);
        assert_eq!(&bytes[170..176], &[8, 0, 8, 0, 8, 0]);

        // Pixel strip right after the bits-per-sample array
        let (_, _, _, slot) = entry(&bytes, 5);
        assert_eq!(u32::from_le_bytes(slot), 176);
        assert_eq!(&bytes[176..194], frame.pixels());

        let (_, _, _, slot) = entry(&bytes, 9);
        assert_eq!(u32::from_le_bytes(slot), 194);
        let (_, _, _, slot) = entry(&bytes, 10);
        assert_eq!(u32::from_le_bytes(slot), 202);
        assert_eq!(&bytes[202..210], &[72, 0, 0, 0, 1, 0, 0, 0]);
        assert_eq!(bytes.len(), 210);

        // Strip byte count
        let (_, _, _, slot) = entry(&bytes, 8);
        assert_eq!(u32::from_le_bytes(slot), 18);
    }

    #[test]
    fn test_without_resolution() {
        let options = TiffOptions {
            resolution: None,
            ..Default::default()
        };
        let bytes = encode_tiff(&gradient(1, 1), &options).unwrap();
        assert_eq!(entry_count(&bytes), 10);
    }

    #[test]
    fn test_bgr_frame_written_as_rgb() {
        let frame = Frame::with_order(vec![1, 2, 3], 1, 1, ChannelOrder::Bgr, 0);
        let bytes = encode_tiff(&frame, &TiffOptions::default()).unwrap();
        let (_, _, _, slot) = entry(&bytes, 5);
        let at = u32::from_le_bytes(slot) as usize;
        assert_eq!(&bytes[at..at + 3], &[3, 2, 1]);
    }

    #[test]
    fn test_invalid_dimensions() {
        let frame = Frame::new(vec![0; 10], 2, 2, 0);
        assert!(matches!(
            encode_tiff(&frame, &TiffOptions::default()),
            Err(TiffError::InvalidFrameDimensions { len: 10, .. })
        ));
        assert!(matches!(
            encode_rgb(&[], 0, 5, &TiffOptions::default()),
            Err(TiffError::InvalidFrameDimensions { .. })
        ));
    }

    #[test]
    fn test_big_endian_round_trip() {
        let frame = gradient(7, 5);
        let options = TiffOptions {
            byte_order: ByteOrder::BigEndian,
            ..Default::default()
        };
        let bytes = encode_tiff(&frame, &options).unwrap();
        assert_eq!(&bytes[..4], &[b'M', b'M', 0, 42]);

        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Tiff)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded.as_raw(), frame.pixels());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_header_and_dimensions(rows in 1u32..40, cols in 1u32..40) {
            let bytes = encode_tiff(&gradient(rows, cols), &TiffOptions::default()).unwrap();
            prop_assert_eq!(&bytes[..2], b"II");

            let (tag, _, _, width) = entry(&bytes, 0);
            prop_assert_eq!(tag, tag::IMAGE_WIDTH);
            prop_assert_eq!(u32::from_le_bytes(width), cols);
            let (tag, _, _, height) = entry(&bytes, 1);
            prop_assert_eq!(tag, tag::IMAGE_LENGTH);
            prop_assert_eq!(u32::from_le_bytes(height), rows);
        }

        #[test]
        fn test_encoding_is_idempotent(rows in 1u32..20, cols in 1u32..20) {
            let frame = gradient(rows, cols);
            let a = encode_tiff(&frame, &TiffOptions::default()).unwrap();
            let b = encode_tiff(&frame, &TiffOptions::default()).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn test_decoder_round_trip(
            rows in 1u32..24,
            cols in 1u32..24,
            seed in any::<u8>(),
        ) {
            let pixels: Vec<u8> = (0..rows * cols * 3)
                .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
                .collect();
            let frame = Frame::new(pixels, rows, cols, 0);
            let bytes = encode_tiff(&frame, &TiffOptions::default()).unwrap();

            let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::Tiff)
                .unwrap()
                .to_rgb8();
            prop_assert_eq!(decoded.dimensions(), (cols, rows));
            prop_assert_eq!(decoded.as_raw(), frame.pixels());
        }
    }
}

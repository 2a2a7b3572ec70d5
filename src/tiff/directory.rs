//! Image file directory: field schema, offset resolution and encoding.
//!
//! A field's value lives in its 4-byte slot when it fits. Otherwise the
//! value is written after the directory and the slot holds its absolute
//! offset. Offsets are resolved by [`Directory::resolve_offsets`] once the
//! number of fields, and therefore the directory length, is final.

use super::header::ByteOrder;
use super::TiffError;

/// Bytes per directory entry.
pub const ENTRY_LEN: u32 = 12;

/// Tag numbers used by baseline RGB images.
pub mod tag {
    /// Image width.
    pub const IMAGE_WIDTH: u16 = 256;
    /// Image height.
    pub const IMAGE_LENGTH: u16 = 257;
    /// Bits per channel.
    pub const BITS_PER_SAMPLE: u16 = 258;
    /// Compression scheme.
    pub const COMPRESSION: u16 = 259;
    /// Color space.
    pub const PHOTOMETRIC_INTERPRETATION: u16 = 262;
    /// Offset of each strip.
    pub const STRIP_OFFSETS: u16 = 273;
    /// Channels per pixel.
    pub const SAMPLES_PER_PIXEL: u16 = 277;
    /// Rows in each strip.
    pub const ROWS_PER_STRIP: u16 = 278;
    /// Bytes in each strip.
    pub const STRIP_BYTE_COUNTS: u16 = 279;
    /// Horizontal resolution.
    pub const X_RESOLUTION: u16 = 282;
    /// Vertical resolution.
    pub const Y_RESOLUTION: u16 = 283;
    /// Chunky or planar layout.
    pub const PLANAR_CONFIGURATION: u16 = 284;
    /// Unit of the resolutions.
    pub const RESOLUTION_UNIT: u16 = 296;
}

/// On-disk field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum FieldType {
    /// 16-bit unsigned.
    Short = 3,
    /// 32-bit unsigned.
    Long = 4,
    /// Two LONGs: numerator, denominator.
    Rational = 5,
}

impl FieldType {
    /// Size of one value of this type.
    pub fn size(self) -> u32 {
        match self {
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Rational => 8,
        }
    }
}

/// A field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    /// SHORT values.
    Short(Vec<u16>),
    /// LONG values.
    Long(Vec<u32>),
    /// Numerator/denominator pairs.
    Rational(Vec<(u32, u32)>),
    /// A single LONG holding the offset of an out-of-line data block.
    DataOffset(&'a [u8]),
}

impl Value<'_> {
    /// Type written to the entry.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Short(_) => FieldType::Short,
            Value::Long(_) | Value::DataOffset(_) => FieldType::Long,
            Value::Rational(_) => FieldType::Rational,
        }
    }

    /// Number of values, as written to the entry.
    pub fn count(&self) -> u32 {
        match self {
            Value::Short(v) => v.len() as u32,
            Value::Long(v) => v.len() as u32,
            Value::Rational(v) => v.len() as u32,
            Value::DataOffset(_) => 1,
        }
    }

    /// Length of the bytes stored after the directory, zero when the value
    /// fits its slot.
    pub fn deferred_len(&self) -> u64 {
        match self {
            Value::DataOffset(data) => data.len() as u64,
            _ => {
                let len = self.count() as u64 * self.field_type().size() as u64;
                if len > 4 {
                    len
                } else {
                    0
                }
            }
        }
    }

    /// Whether the payload lives after the directory.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::DataOffset(_)) || self.deferred_len() > 0
    }

    fn encode_values(&self, order: ByteOrder, out: &mut Vec<u8>) {
        match self {
            Value::Short(v) => v.iter().for_each(|&s| out.extend(order.u16_bytes(s))),
            Value::Long(v) => v.iter().for_each(|&l| out.extend(order.u32_bytes(l))),
            Value::Rational(v) => v.iter().for_each(|&(n, d)| {
                out.extend(order.u32_bytes(n));
                out.extend(order.u32_bytes(d));
            }),
            Value::DataOffset(data) => out.extend_from_slice(data),
        }
    }
}

/// One directory entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Field<'a> {
    /// Tag number.
    pub tag: u16,
    /// Field payload.
    pub value: Value<'a>,
}

impl<'a> Field<'a> {
    /// A field with any value.
    pub fn new(tag: u16, value: Value<'a>) -> Self {
        Self { tag, value }
    }

    /// A single SHORT.
    pub fn short(tag: u16, v: u16) -> Self {
        Self::new(tag, Value::Short(vec![v]))
    }

    /// A single LONG.
    pub fn long(tag: u16, v: u32) -> Self {
        Self::new(tag, Value::Long(vec![v]))
    }
}

/// A single image file directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Directory<'a> {
    fields: Vec<Field<'a>>,
}

impl<'a> Directory<'a> {
    /// Builds a directory, ordering fields by ascending tag.
    ///
    /// Fails if a tag appears twice.
    pub fn new(mut fields: Vec<Field<'a>>) -> Result<Self, TiffError> {
        fields.sort_by_key(|f| f.tag);
        if let Some(pair) = fields.windows(2).find(|w| w[0].tag == w[1].tag) {
            return Err(TiffError::DuplicateTag(pair[0].tag));
        }
        Ok(Self { fields })
    }

    /// Fields in ascending tag order.
    pub fn fields(&self) -> &[Field<'a>] {
        &self.fields
    }

    /// Encoded length: entry count, entries, next-directory offset.
    pub fn len(&self) -> u32 {
        2 + ENTRY_LEN * self.fields.len() as u32 + 4
    }

    /// Whether the directory has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Absolute offsets of the deferred values, one per field in order
    /// (`None` for inline values).
    ///
    /// Deferred values are laid out back to back right after the directory,
    /// in field order, without padding.
    pub fn resolve_offsets(&self, directory_offset: u32) -> Result<Vec<Option<u32>>, TiffError> {
        let mut next = directory_offset as u64 + self.len() as u64;
        let mut offsets = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            if field.value.is_deferred() {
                let offset = u32::try_from(next).map_err(|_| TiffError::TooLarge(next))?;
                offsets.push(Some(offset));
                next += field.value.deferred_len();
            } else {
                offsets.push(None);
            }
        }
        // Every deferred block must also end inside the 32-bit address space
        u32::try_from(next).map_err(|_| TiffError::TooLarge(next))?;
        Ok(offsets)
    }

    /// Encodes the directory followed by its deferred values.
    pub fn encode(&self, order: ByteOrder, directory_offset: u32) -> Result<Vec<u8>, TiffError> {
        let offsets = self.resolve_offsets(directory_offset)?;
        let deferred: u64 = self.fields.iter().map(|f| f.value.deferred_len()).sum();
        let mut out = Vec::with_capacity(self.len() as usize + deferred as usize);

        out.extend(order.u16_bytes(self.fields.len() as u16));
        for (field, offset) in self.fields.iter().zip(&offsets) {
            out.extend(order.u16_bytes(field.tag));
            out.extend(order.u16_bytes(field.value.field_type() as u16));
            out.extend(order.u32_bytes(field.value.count()));
            match offset {
                Some(offset) => out.extend(order.u32_bytes(*offset)),
                None => {
                    // Inline values are left-justified in the slot
                    let start = out.len();
                    field.value.encode_values(order, &mut out);
                    out.resize(start + 4, 0);
                }
            }
        }
        out.extend(order.u32_bytes(0));

        for field in self.fields.iter().filter(|f| f.value.is_deferred()) {
            field.value.encode_values(order, &mut out);
        }
        Ok(out)
    }
}

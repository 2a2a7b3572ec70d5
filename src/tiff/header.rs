//! The 8-byte TIFF header and byte-order handling.

/// Length of the header in bytes.
pub const HEADER_LEN: u32 = 8;

/// Format identifier that follows the byte-order marker.
pub const MAGIC: u16 = 42;

/// Byte order of every multi-byte value in the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// `II`, least significant byte first.
    #[default]
    LittleEndian,
    /// `MM`, most significant byte first.
    BigEndian,
}

impl ByteOrder {
    /// The two marker bytes at the start of the file.
    pub fn marker(self) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => *b"II",
            ByteOrder::BigEndian => *b"MM",
        }
    }

    /// Writes `v` in this order.
    pub fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            ByteOrder::LittleEndian => v.to_le_bytes(),
            ByteOrder::BigEndian => v.to_be_bytes(),
        }
    }

    /// Writes `v` in this order.
    pub fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            ByteOrder::LittleEndian => v.to_le_bytes(),
            ByteOrder::BigEndian => v.to_be_bytes(),
        }
    }

    /// Reads a SHORT in this order.
    pub fn read_u16(self, b: [u8; 2]) -> u16 {
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(b),
            ByteOrder::BigEndian => u16::from_be_bytes(b),
        }
    }

    /// Reads a LONG in this order.
    pub fn read_u32(self, b: [u8; 4]) -> u32 {
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(b),
            ByteOrder::BigEndian => u32::from_be_bytes(b),
        }
    }
}

/// File header: byte order, magic number, offset of the first directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Byte order of the whole file.
    pub order: ByteOrder,
    /// Offset of the first directory.
    pub first_ifd: u32,
}

impl Header {
    /// Header whose directory immediately follows it.
    pub fn new(order: ByteOrder) -> Self {
        Self {
            order,
            first_ifd: HEADER_LEN,
        }
    }

    /// The 8 header bytes.
    pub fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut out = [0u8; HEADER_LEN as usize];
        out[0..2].copy_from_slice(&self.order.marker());
        out[2..4].copy_from_slice(&self.order.u16_bytes(MAGIC));
        out[4..8].copy_from_slice(&self.order.u32_bytes(self.first_ifd));
        out
    }
}

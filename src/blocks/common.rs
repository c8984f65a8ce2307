//! Common types, traits, and helper functions for MDF3 block parsing.
//!
//! This module provides:
//! - [`BlockHeader`]: The 4-byte header present in all linked MDF3 blocks
//! - [`BlockParse`]: Trait for parsing blocks from bytes
//! - [`DataType`]: Enum representing MDF3 channel data types
//! - Byte parsing helper functions to reduce code duplication
//!
//! All multi-byte fields in an MDF3 file are little-endian and block
//! addresses are 32 bits wide.

use crate::{Error, Result};

// ============================================================================
// Byte Parsing Helpers
// ============================================================================

/// Read a u16 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Read an i16 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_i16(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

/// Read a u32 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Read a u64 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
        bytes[offset + 4],
        bytes[offset + 5],
        bytes[offset + 6],
        bytes[offset + 7],
    ])
}

/// Read an f64 from a byte slice at the given offset (little-endian).
#[inline]
pub fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    f64::from_bits(read_u64(bytes, offset))
}

/// Read a fixed-width Latin-1 text field, trimming trailing NULs and spaces.
pub fn read_str(bytes: &[u8], offset: usize, width: usize) -> String {
    let field = &bytes[offset..offset + width];
    let end = field.iter().position(|&b| b == 0).unwrap_or(width);
    field[..end]
        .iter()
        .map(|&b| b as char)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// Write `text` into a fixed-width NUL-padded Latin-1 field.
pub fn write_str(buffer: &mut Vec<u8>, text: &str, width: usize) {
    let mut field = vec![0u8; width];
    for (dst, ch) in field.iter_mut().zip(text.chars()) {
        // Characters above Latin-1 degrade to '?'
        *dst = if (ch as u32) < 256 { ch as u8 } else { b'?' };
    }
    // Keep the field NUL-terminated even for over-long names
    if width > 0 {
        field[width - 1] = 0;
    }
    buffer.extend_from_slice(&field);
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a buffer has at least `expected` bytes.
///
/// Returns `Err(TooShortBuffer)` if the buffer is too small.
#[inline]
pub fn validate_buffer_size(bytes: &[u8], expected: usize) -> Result<()> {
    if bytes.len() < expected {
        return Err(Error::TooShortBuffer {
            actual: bytes.len(),
            expected,
            file: file!(),
            line: line!(),
        });
    }
    Ok(())
}

/// Safely convert a u32 file address to usize for indexing.
#[inline]
pub fn addr_to_usize(value: u32) -> usize {
    value as usize
}

/// The 4-byte header shared by every linked MDF3 block: a two character
/// ASCII identifier followed by the total block size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockHeader {
    /// 2-byte block type identifier (e.g., "HD", "DG").
    pub id: String,
    /// Total length of the block in bytes, including this header.
    pub size: u16,
}

impl BlockHeader {
    pub fn new(id: &str, size: u16) -> Self {
        BlockHeader {
            id: id.to_string(),
            size,
        }
    }

    /// Parse a block header from the first 4 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, 4)?;
        let id = match core::str::from_utf8(&bytes[0..2]) {
            Ok(s) => String::from(s),
            Err(_) => String::from_utf8_lossy(&bytes[0..2]).into_owned(),
        };
        Ok(Self {
            id,
            size: read_u16(bytes, 2),
        })
    }

    /// Serialize the header: 2 identifier bytes plus the size field.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(4);
        let id_bytes = self.id.as_bytes();
        let mut id_field = [b' '; 2];
        let id_len = core::cmp::min(id_bytes.len(), 2);
        id_field[..id_len].copy_from_slice(&id_bytes[..id_len]);
        buffer.extend_from_slice(&id_field);
        buffer.extend_from_slice(&self.size.to_le_bytes());
        buffer
    }
}

pub trait BlockParse<'a>: Sized {
    const ID: &'static str;

    fn parse_header(bytes: &[u8]) -> Result<BlockHeader> {
        let header = BlockHeader::from_bytes(bytes)?;
        if header.id != Self::ID {
            return Err(Error::BlockIDError {
                actual: header.id.clone(),
                expected: Self::ID.to_string(),
            });
        }
        Ok(header)
    }

    fn from_bytes(bytes: &'a [u8]) -> Result<Self>;
}

/// MDF3 channel data type.
///
/// Codes 0..=3 carry the file's default byte order, which this crate treats
/// as little-endian; codes 9..=12 are explicitly big-endian and 13..=16
/// explicitly little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    UnsignedIntegerLE,
    UnsignedIntegerBE,
    SignedIntegerLE,
    SignedIntegerBE,
    /// 32-bit IEEE float
    FloatLE,
    FloatBE,
    /// 64-bit IEEE float
    DoubleLE,
    DoubleBE,
    StringAscii,
    ByteArray,
    Unknown(u16),
}

impl DataType {
    /// Convert a numeric representation to the corresponding `DataType`.
    /// Values outside the known range yield `DataType::Unknown`.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 | 13 => DataType::UnsignedIntegerLE,
            1 | 14 => DataType::SignedIntegerLE,
            2 | 15 => DataType::FloatLE,
            3 | 16 => DataType::DoubleLE,
            7 => DataType::StringAscii,
            8 => DataType::ByteArray,
            9 => DataType::UnsignedIntegerBE,
            10 => DataType::SignedIntegerBE,
            11 => DataType::FloatBE,
            12 => DataType::DoubleBE,
            other => DataType::Unknown(other),
        }
    }

    /// Converts the DataType to its canonical u16 code.
    pub fn to_u16(&self) -> u16 {
        match self {
            DataType::UnsignedIntegerLE => 0,
            DataType::SignedIntegerLE => 1,
            DataType::FloatLE => 2,
            DataType::DoubleLE => 3,
            DataType::StringAscii => 7,
            DataType::ByteArray => 8,
            DataType::UnsignedIntegerBE => 9,
            DataType::SignedIntegerBE => 10,
            DataType::FloatBE => 11,
            DataType::DoubleBE => 12,
            DataType::Unknown(v) => *v,
        }
    }

    /// True for the explicitly big-endian codes.
    pub fn is_big_endian(&self) -> bool {
        matches!(
            self,
            DataType::UnsignedIntegerBE
                | DataType::SignedIntegerBE
                | DataType::FloatBE
                | DataType::DoubleBE
        )
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, DataType::SignedIntegerLE | DataType::SignedIntegerBE)
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            DataType::FloatLE | DataType::FloatBE | DataType::DoubleLE | DataType::DoubleBE
        )
    }

    /// String and opaque byte-array types occupy whole bytes and never get
    /// rounded up to a standard numeric field width.
    pub fn is_bytes_like(&self) -> bool {
        matches!(self, DataType::StringAscii | DataType::ByteArray)
    }
}

impl core::fmt::Display for DataType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DataType::UnsignedIntegerLE => write!(f, "uint (LE)"),
            DataType::UnsignedIntegerBE => write!(f, "uint (BE)"),
            DataType::SignedIntegerLE => write!(f, "int (LE)"),
            DataType::SignedIntegerBE => write!(f, "int (BE)"),
            DataType::FloatLE => write!(f, "float32 (LE)"),
            DataType::FloatBE => write!(f, "float32 (BE)"),
            DataType::DoubleLE => write!(f, "float64 (LE)"),
            DataType::DoubleBE => write!(f, "float64 (BE)"),
            DataType::StringAscii => write!(f, "string"),
            DataType::ByteArray => write!(f, "byte array"),
            DataType::Unknown(v) => write!(f, "unknown ({v})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_header_roundtrip() {
        let h = BlockHeader::new("CN", 228);
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), 4);
        let parsed = BlockHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, h);
    }

    #[test]
    fn data_type_codes() {
        assert_eq!(DataType::from_u16(0), DataType::UnsignedIntegerLE);
        assert_eq!(DataType::from_u16(13), DataType::UnsignedIntegerLE);
        assert_eq!(DataType::from_u16(9), DataType::UnsignedIntegerBE);
        assert_eq!(DataType::from_u16(16), DataType::DoubleLE);
        assert!(DataType::SignedIntegerBE.is_big_endian());
        assert!(DataType::SignedIntegerBE.is_signed());
        assert!(DataType::StringAscii.is_bytes_like());
        assert_eq!(DataType::from_u16(42), DataType::Unknown(42));
    }

    #[test]
    fn fixed_string_roundtrip() {
        let mut buf = Vec::new();
        write_str(&mut buf, "engine_speed", 32);
        assert_eq!(buf.len(), 32);
        assert_eq!(read_str(&buf, 0, 32), "engine_speed");
    }
}

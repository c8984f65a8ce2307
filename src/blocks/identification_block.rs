use crate::{Error, Result};
use crate::blocks::common::{read_str, read_u16, validate_buffer_size, write_str};

pub const ID_BLOCK_SIZE: usize = 64;

/// IDBLOCK: the fixed 64-byte identification block at file offset 0.
///
/// Unlike every other MDF3 block it carries no 4-byte header; the literal
/// `"MDF     "` magic doubles as its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentificationBlock {
    /// Always "MDF     " for finalized files.
    pub file_id: String,
    /// Human readable version, e.g. "3.30".
    pub version_str: String,
    /// Writing program identification.
    pub program: String,
    /// Default byte order: 0 = little-endian, 1 = big-endian.
    pub byte_order: u16,
    /// Default floating point format, 0 = IEEE 754.
    pub float_format: u16,
    /// Numeric version, e.g. 330.
    pub version: u16,
    /// Code page of text fields (0 = unspecified).
    pub code_page: u16,
    pub unfinalized_standard_flags: u16,
    pub unfinalized_custom_flags: u16,
}

impl Default for IdentificationBlock {
    fn default() -> Self {
        IdentificationBlock {
            file_id: String::from("MDF     "),
            version_str: String::from("3.30"),
            program: String::from("mdf3-rs"),
            byte_order: 0,
            float_format: 0,
            version: 330,
            code_page: 0,
            unfinalized_standard_flags: 0,
            unfinalized_custom_flags: 0,
        }
    }
}

impl IdentificationBlock {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        validate_buffer_size(bytes, ID_BLOCK_SIZE)?;

        let file_id: String = bytes[0..8].iter().map(|&b| b as char).collect();
        if file_id != "MDF     " {
            return Err(Error::FileIdentifierError(file_id));
        }

        let version_str = read_str(bytes, 8, 8);
        let version = read_u16(bytes, 28);
        if !(300..400).contains(&version) {
            return Err(Error::UnsupportedVersion(version_str));
        }

        Ok(Self {
            file_id,
            version_str,
            program: read_str(bytes, 16, 8),
            byte_order: read_u16(bytes, 24),
            float_format: read_u16(bytes, 26),
            version,
            code_page: read_u16(bytes, 30),
            unfinalized_standard_flags: read_u16(bytes, 60),
            unfinalized_custom_flags: read_u16(bytes, 62),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(ID_BLOCK_SIZE);
        buffer.extend_from_slice(b"MDF     ");
        write_str(&mut buffer, &self.version_str, 8);
        write_str(&mut buffer, &self.program, 8);
        buffer.extend_from_slice(&self.byte_order.to_le_bytes());
        buffer.extend_from_slice(&self.float_format.to_le_bytes());
        buffer.extend_from_slice(&self.version.to_le_bytes());
        buffer.extend_from_slice(&self.code_page.to_le_bytes());
        buffer.extend_from_slice(&[0u8; 28]);
        buffer.extend_from_slice(&self.unfinalized_standard_flags.to_le_bytes());
        buffer.extend_from_slice(&self.unfinalized_custom_flags.to_le_bytes());
        debug_assert_eq!(buffer.len(), ID_BLOCK_SIZE);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identification_roundtrip() {
        let id = IdentificationBlock::default();
        let bytes = id.to_bytes();
        assert_eq!(bytes.len(), ID_BLOCK_SIZE);
        let parsed = IdentificationBlock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.version, 330);
        assert_eq!(parsed.version_str, "3.30");
    }

    #[test]
    fn rejects_foreign_magic() {
        let mut bytes = IdentificationBlock::default().to_bytes();
        bytes[0..8].copy_from_slice(b"RIFFdata");
        assert!(matches!(
            IdentificationBlock::from_bytes(&bytes),
            Err(Error::FileIdentifierError(_))
        ));
    }

    #[test]
    fn rejects_mdf4_version() {
        let mut bytes = IdentificationBlock::default().to_bytes();
        bytes[28..30].copy_from_slice(&410u16.to_le_bytes());
        assert!(matches!(
            IdentificationBlock::from_bytes(&bytes),
            Err(Error::UnsupportedVersion(_))
        ));
    }
}

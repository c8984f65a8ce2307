use crate::Result;
use crate::blocks::common::{BlockHeader, BlockParse, validate_buffer_size};

/// PRBLOCK: opaque program-specific payload referenced from the header.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramBlock {
    pub header: BlockHeader,
    pub data: Vec<u8>,
}

impl ProgramBlock {
    pub fn new(data: Vec<u8>) -> Self {
        ProgramBlock {
            header: BlockHeader::new("PR", (4 + data.len()) as u16),
            data,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = self.header.to_bytes();
        buffer.extend_from_slice(&self.data);
        buffer
    }
}

impl BlockParse<'_> for ProgramBlock {
    const ID: &'static str = "PR";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let size = header.size as usize;
        validate_buffer_size(bytes, size)?;
        Ok(Self {
            data: bytes[4..size].to_vec(),
            header,
        })
    }
}

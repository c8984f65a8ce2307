use crate::Result;
use crate::blocks::common::{BlockHeader, BlockParse, validate_buffer_size};

/// TXBLOCK: a NUL-terminated Latin-1 text payload.
///
/// Used for comments, long channel names and value-range-to-text targets.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub header: BlockHeader,
    pub text: String,
}

impl TextBlock {
    pub fn new(text: &str) -> Self {
        let size = 4 + text.len() + 1;
        TextBlock {
            header: BlockHeader::new("TX", size as u16),
            text: text.to_string(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = self.header.to_bytes();
        buffer.extend(self.text.chars().map(|c| if (c as u32) < 256 { c as u8 } else { b'?' }));
        buffer.push(0);
        buffer
    }
}

impl BlockParse<'_> for TextBlock {
    const ID: &'static str = "TX";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        let size = header.size as usize;
        validate_buffer_size(bytes, size)?;
        let payload = &bytes[4..size];
        let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
        let text = payload[..end].iter().map(|&b| b as char).collect();
        Ok(Self { header, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_block_roundtrip() {
        let tb = TextBlock::new("hello world");
        let bytes = tb.to_bytes();
        assert_eq!(bytes.len(), tb.header.size as usize);
        let parsed = TextBlock::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.text, "hello world");
    }
}

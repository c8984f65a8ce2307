use crate::Result;
use crate::blocks::common::{BlockHeader, BlockParse, read_u16, read_u32, validate_buffer_size};

pub const CG_BLOCK_SIZE: usize = 30;

/// CGBLOCK: a channel group with a fixed record byte size and cycle count.
///
/// `record_id` matters only when the owning data group multiplexes several
/// record types (`record_id_len > 0`).
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelGroupBlock {
    pub header: BlockHeader,
    pub next_cg_addr: u32,
    pub first_ch_addr: u32,
    pub comment_addr: u32,
    pub record_id: u16,
    pub channel_count: u16,
    /// Record byte size, excluding any record identifier bytes.
    pub record_size: u16,
    /// Number of records (rows) stored for this group.
    pub cycle_count: u32,
    pub first_sample_reduction_addr: u32,
}

impl Default for ChannelGroupBlock {
    fn default() -> Self {
        ChannelGroupBlock {
            header: BlockHeader::new("CG", CG_BLOCK_SIZE as u16),
            next_cg_addr: 0,
            first_ch_addr: 0,
            comment_addr: 0,
            record_id: 0,
            channel_count: 0,
            record_size: 0,
            cycle_count: 0,
            first_sample_reduction_addr: 0,
        }
    }
}

impl BlockParse<'_> for ChannelGroupBlock {
    const ID: &'static str = "CG";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, 26)?;
        // The sample-reduction link appeared in v3.3
        let has_sr = header.size as usize >= CG_BLOCK_SIZE && bytes.len() >= CG_BLOCK_SIZE;
        Ok(Self {
            next_cg_addr: read_u32(bytes, 4),
            first_ch_addr: read_u32(bytes, 8),
            comment_addr: read_u32(bytes, 12),
            record_id: read_u16(bytes, 16),
            channel_count: read_u16(bytes, 18),
            record_size: read_u16(bytes, 20),
            cycle_count: read_u32(bytes, 22),
            first_sample_reduction_addr: if has_sr { read_u32(bytes, 26) } else { 0 },
            header,
        })
    }
}

impl ChannelGroupBlock {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = BlockHeader::new("CG", CG_BLOCK_SIZE as u16).to_bytes();
        buffer.extend_from_slice(&self.next_cg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_ch_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        buffer.extend_from_slice(&self.record_id.to_le_bytes());
        buffer.extend_from_slice(&self.channel_count.to_le_bytes());
        buffer.extend_from_slice(&self.record_size.to_le_bytes());
        buffer.extend_from_slice(&self.cycle_count.to_le_bytes());
        buffer.extend_from_slice(&self.first_sample_reduction_addr.to_le_bytes());
        debug_assert_eq!(buffer.len(), CG_BLOCK_SIZE);
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_group_roundtrip() {
        let mut cg = ChannelGroupBlock::default();
        cg.record_id = 3;
        cg.channel_count = 4;
        cg.record_size = 12;
        cg.cycle_count = 1000;
        let parsed = ChannelGroupBlock::from_bytes(&cg.to_bytes()).unwrap();
        assert_eq!(parsed, cg);
    }
}

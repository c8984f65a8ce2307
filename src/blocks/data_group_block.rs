use crate::Result;
use crate::blocks::common::{BlockHeader, BlockParse, read_u16, read_u32, validate_buffer_size};

pub const DG_BLOCK_SIZE: usize = 28;

/// DGBLOCK: a data group, owning one raw record stream shared by its
/// channel groups.
///
/// `record_id_len` is 0 for sorted groups (a single record type), 1 when
/// every record carries a leading identifier byte, and 2 when the
/// identifier is repeated after the record.
#[derive(Debug, Clone, PartialEq)]
pub struct DataGroupBlock {
    pub header: BlockHeader,
    pub next_dg_addr: u32,
    pub first_cg_addr: u32,
    pub trigger_addr: u32,
    /// Address of the raw record bytes. MDF3 data has no block header; this
    /// points straight at the first record.
    pub data_addr: u32,
    pub cg_count: u16,
    pub record_id_len: u16,
}

impl Default for DataGroupBlock {
    fn default() -> Self {
        DataGroupBlock {
            header: BlockHeader::new("DG", DG_BLOCK_SIZE as u16),
            next_dg_addr: 0,
            first_cg_addr: 0,
            trigger_addr: 0,
            data_addr: 0,
            cg_count: 0,
            record_id_len: 0,
        }
    }
}

impl BlockParse<'_> for DataGroupBlock {
    const ID: &'static str = "DG";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, DG_BLOCK_SIZE)?;
        Ok(Self {
            header,
            next_dg_addr: read_u32(bytes, 4),
            first_cg_addr: read_u32(bytes, 8),
            trigger_addr: read_u32(bytes, 12),
            data_addr: read_u32(bytes, 16),
            cg_count: read_u16(bytes, 20),
            record_id_len: read_u16(bytes, 22),
        })
    }
}

impl DataGroupBlock {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = BlockHeader::new("DG", DG_BLOCK_SIZE as u16).to_bytes();
        buffer.extend_from_slice(&self.next_dg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.first_cg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.trigger_addr.to_le_bytes());
        buffer.extend_from_slice(&self.data_addr.to_le_bytes());
        buffer.extend_from_slice(&self.cg_count.to_le_bytes());
        buffer.extend_from_slice(&self.record_id_len.to_le_bytes());
        buffer.extend_from_slice(&0u32.to_le_bytes());
        debug_assert_eq!(buffer.len(), DG_BLOCK_SIZE);
        buffer
    }

    /// A sorted data group holds exactly one record type and no record IDs.
    pub fn is_sorted(&self) -> bool {
        self.record_id_len == 0
    }
}

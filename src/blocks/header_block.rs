use crate::Result;
use crate::blocks::common::{
    BlockHeader, BlockParse, read_i16, read_str, read_u16, read_u32, read_u64,
    validate_buffer_size, write_str,
};

/// Size written by this crate (v3.2+ layout with the timestamp tail).
pub const HD_BLOCK_SIZE: usize = 208;
/// Minimum size of the pre-3.2 layout.
pub const HD_BLOCK_SIZE_MIN: usize = 164;

/// HDBLOCK: file header, anchor of the data-group linked list.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderBlock {
    pub header: BlockHeader,
    /// Address of the first data group block, 0 when the file is empty.
    pub first_dg_addr: u32,
    pub comment_addr: u32,
    pub program_addr: u32,
    /// Number of data groups in the file.
    pub dg_count: u16,
    /// Recording date as "DD:MM:YYYY".
    pub date: String,
    /// Recording time as "HH:MM:SS".
    pub time: String,
    pub author: String,
    pub department: String,
    pub project: String,
    pub subject: String,
    /// Nanoseconds since the epoch (v3.2+).
    pub abs_time: u64,
    /// UTC offset in hours (v3.2+).
    pub tz_offset: i16,
    pub time_quality: u16,
    pub timer_id: String,
}

impl Default for HeaderBlock {
    fn default() -> Self {
        HeaderBlock {
            header: BlockHeader::new("HD", HD_BLOCK_SIZE as u16),
            first_dg_addr: 0,
            comment_addr: 0,
            program_addr: 0,
            dg_count: 0,
            date: String::new(),
            time: String::new(),
            author: String::new(),
            department: String::new(),
            project: String::new(),
            subject: String::new(),
            abs_time: 0,
            tz_offset: 0,
            time_quality: 0,
            timer_id: String::from("local PC reference timer"),
        }
    }
}

impl BlockParse<'_> for HeaderBlock {
    const ID: &'static str = "HD";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, HD_BLOCK_SIZE_MIN)?;

        // The timestamp tail exists only from v3.2 on
        let has_tail = header.size as usize >= HD_BLOCK_SIZE && bytes.len() >= HD_BLOCK_SIZE;

        Ok(Self {
            first_dg_addr: read_u32(bytes, 4),
            comment_addr: read_u32(bytes, 8),
            program_addr: read_u32(bytes, 12),
            dg_count: read_u16(bytes, 16),
            date: read_str(bytes, 18, 10),
            time: read_str(bytes, 28, 8),
            author: read_str(bytes, 36, 32),
            department: read_str(bytes, 68, 32),
            project: read_str(bytes, 100, 32),
            subject: read_str(bytes, 132, 32),
            abs_time: if has_tail { read_u64(bytes, 164) } else { 0 },
            tz_offset: if has_tail { read_i16(bytes, 172) } else { 0 },
            time_quality: if has_tail { read_u16(bytes, 174) } else { 0 },
            timer_id: if has_tail {
                read_str(bytes, 176, 32)
            } else {
                String::new()
            },
            header,
        })
    }
}

impl HeaderBlock {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = BlockHeader::new("HD", HD_BLOCK_SIZE as u16).to_bytes();
        buffer.extend_from_slice(&self.first_dg_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        buffer.extend_from_slice(&self.program_addr.to_le_bytes());
        buffer.extend_from_slice(&self.dg_count.to_le_bytes());
        write_str(&mut buffer, &self.date, 10);
        write_str(&mut buffer, &self.time, 8);
        write_str(&mut buffer, &self.author, 32);
        write_str(&mut buffer, &self.department, 32);
        write_str(&mut buffer, &self.project, 32);
        write_str(&mut buffer, &self.subject, 32);
        buffer.extend_from_slice(&self.abs_time.to_le_bytes());
        buffer.extend_from_slice(&self.tz_offset.to_le_bytes());
        buffer.extend_from_slice(&self.time_quality.to_le_bytes());
        write_str(&mut buffer, &self.timer_id, 32);
        debug_assert_eq!(buffer.len(), HD_BLOCK_SIZE);
        buffer
    }
}

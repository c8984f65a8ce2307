use crate::Result;
use crate::blocks::common::{
    BlockHeader, BlockParse, DataType, addr_to_usize, read_f64, read_str, read_u16, read_u32,
    validate_buffer_size, write_str,
};
use crate::blocks::conversion::ConversionBlock;
use crate::blocks::text_block::TextBlock;

pub const CN_BLOCK_SIZE: usize = 228;

/// Channel type code for an ordinary data channel.
pub const CHANNEL_TYPE_DATA: u16 = 0;
/// Channel type code for the master (time) channel of a group.
pub const CHANNEL_TYPE_MASTER: u16 = 1;

/// CNBLOCK: one channel's geometry and metadata within a channel group.
///
/// The position of the channel's value inside a record is
/// `start_offset + 8 * additional_byte_offset` bits from the start of the
/// record; `start_offset` alone is limited to 16 bits by the format.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelBlock {
    pub header: BlockHeader,
    pub next_ch_addr: u32,
    pub conversion_addr: u32,
    pub source_addr: u32,
    pub dependency_addr: u32,
    pub comment_addr: u32,
    /// 0 = data channel, 1 = master (time) channel.
    pub channel_type: u16,
    pub short_name: String,
    pub description: String,
    /// Bit offset of the value within the record (see `start_bit`).
    pub start_offset: u16,
    pub bit_count: u16,
    pub data_type: DataType,
    pub range_valid: u16,
    pub min_raw_value: f64,
    pub max_raw_value: f64,
    pub sampling_rate: f64,
    pub long_name_addr: u32,
    pub display_name_addr: u32,
    /// Extends `start_offset` in whole bytes for offsets beyond 16 bits.
    pub additional_byte_offset: u16,

    // Resolved fields, populated while parsing
    pub name: Option<String>,
    pub conversion: Option<ConversionBlock>,
}

impl Default for ChannelBlock {
    fn default() -> Self {
        ChannelBlock {
            header: BlockHeader::new("CN", CN_BLOCK_SIZE as u16),
            next_ch_addr: 0,
            conversion_addr: 0,
            source_addr: 0,
            dependency_addr: 0,
            comment_addr: 0,
            channel_type: CHANNEL_TYPE_DATA,
            short_name: String::new(),
            description: String::new(),
            start_offset: 0,
            bit_count: 0,
            data_type: DataType::UnsignedIntegerLE,
            range_valid: 0,
            min_raw_value: 0.0,
            max_raw_value: 0.0,
            sampling_rate: 0.0,
            long_name_addr: 0,
            display_name_addr: 0,
            additional_byte_offset: 0,
            name: None,
            conversion: None,
        }
    }
}

impl BlockParse<'_> for ChannelBlock {
    const ID: &'static str = "CN";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, CN_BLOCK_SIZE)?;

        Ok(Self {
            header,
            next_ch_addr: read_u32(bytes, 4),
            conversion_addr: read_u32(bytes, 8),
            source_addr: read_u32(bytes, 12),
            dependency_addr: read_u32(bytes, 16),
            comment_addr: read_u32(bytes, 20),
            channel_type: read_u16(bytes, 24),
            short_name: read_str(bytes, 26, 32),
            description: read_str(bytes, 58, 128),
            start_offset: read_u16(bytes, 186),
            bit_count: read_u16(bytes, 188),
            data_type: DataType::from_u16(read_u16(bytes, 190)),
            range_valid: read_u16(bytes, 192),
            min_raw_value: read_f64(bytes, 194),
            max_raw_value: read_f64(bytes, 202),
            sampling_rate: read_f64(bytes, 210),
            long_name_addr: read_u32(bytes, 218),
            display_name_addr: read_u32(bytes, 222),
            additional_byte_offset: read_u16(bytes, 226),
            name: None,
            conversion: None,
        })
    }
}

impl ChannelBlock {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = BlockHeader::new("CN", CN_BLOCK_SIZE as u16).to_bytes();
        buffer.extend_from_slice(&self.next_ch_addr.to_le_bytes());
        buffer.extend_from_slice(&self.conversion_addr.to_le_bytes());
        buffer.extend_from_slice(&self.source_addr.to_le_bytes());
        buffer.extend_from_slice(&self.dependency_addr.to_le_bytes());
        buffer.extend_from_slice(&self.comment_addr.to_le_bytes());
        buffer.extend_from_slice(&self.channel_type.to_le_bytes());
        write_str(&mut buffer, self.display_name(), 32);
        write_str(&mut buffer, &self.description, 128);
        buffer.extend_from_slice(&self.start_offset.to_le_bytes());
        buffer.extend_from_slice(&self.bit_count.to_le_bytes());
        buffer.extend_from_slice(&self.data_type.to_u16().to_le_bytes());
        buffer.extend_from_slice(&self.range_valid.to_le_bytes());
        buffer.extend_from_slice(&self.min_raw_value.to_le_bytes());
        buffer.extend_from_slice(&self.max_raw_value.to_le_bytes());
        buffer.extend_from_slice(&self.sampling_rate.to_le_bytes());
        buffer.extend_from_slice(&self.long_name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.display_name_addr.to_le_bytes());
        buffer.extend_from_slice(&self.additional_byte_offset.to_le_bytes());
        debug_assert_eq!(buffer.len(), CN_BLOCK_SIZE);
        buffer
    }

    /// Absolute bit position of this channel's value within the record.
    #[inline]
    pub fn start_bit(&self) -> u32 {
        self.start_offset as u32 + 8 * self.additional_byte_offset as u32
    }

    /// Resolved long name when present, otherwise the short name.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.short_name)
    }

    /// True for the group's master (time) channel.
    pub fn is_master(&self) -> bool {
        self.channel_type == CHANNEL_TYPE_MASTER
    }

    /// Load the channel's long name from the file using `long_name_addr`.
    pub fn resolve_name(&mut self, file_data: &[u8]) -> Result<()> {
        if self.name.is_none() && self.long_name_addr != 0 {
            let offset = addr_to_usize(self.long_name_addr);
            if offset + 4 <= file_data.len() {
                let text_block = TextBlock::from_bytes(&file_data[offset..])?;
                self.name = Some(text_block.text);
            }
        }
        if self.name.is_none() {
            self.name = Some(self.short_name.clone());
        }
        Ok(())
    }

    /// Resolve and store the conversion block pointed to by `conversion_addr`.
    pub fn resolve_conversion(&mut self, file_data: &[u8]) -> Result<()> {
        if self.conversion.is_none() && self.conversion_addr != 0 {
            let offset = addr_to_usize(self.conversion_addr);
            validate_buffer_size(file_data, offset + 4)?;
            let mut block = ConversionBlock::from_bytes(&file_data[offset..])?;
            block.resolve_texts(file_data)?;
            self.conversion = Some(block);
        }
        Ok(())
    }

    /// Physical unit from the conversion block, empty if none.
    pub fn unit(&self) -> &str {
        self.conversion.as_ref().map(|c| c.unit.as_str()).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_roundtrip() {
        let mut cn = ChannelBlock::default();
        cn.short_name = String::from("rpm");
        cn.start_offset = 24;
        cn.bit_count = 12;
        cn.data_type = DataType::UnsignedIntegerLE;
        cn.additional_byte_offset = 2;
        let parsed = ChannelBlock::from_bytes(&cn.to_bytes()).unwrap();
        assert_eq!(parsed.short_name, "rpm");
        assert_eq!(parsed.start_offset, 24);
        assert_eq!(parsed.bit_count, 12);
        assert_eq!(parsed.start_bit(), 24 + 16);
    }

    #[test]
    fn start_bit_includes_additional_byte_offset() {
        let mut cn = ChannelBlock::default();
        cn.start_offset = 4;
        cn.additional_byte_offset = 8192;
        assert_eq!(cn.start_bit(), 4 + 8 * 8192);
    }
}

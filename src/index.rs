//! Lightweight file indexes.
//!
//! An [`MdfIndex`] captures just enough of a file's structure (channel
//! geometry, conversions, data-region offsets) to read individual channels
//! later without reparsing the block graph. Indexes serialize to JSON, so
//! a one-time scan of a large file can be reused across processes.
//!
//! Reading goes through the [`ByteRangeReader`] trait; [`FileRangeReader`]
//! covers the local-file case, and remote backends only need to supply
//! ranged reads.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bitfield::extract_bit_field;
use crate::blocks::{ChannelBlock, ConversionBlock, DataType};
use crate::fragment::{FragmentStream, StreamConfig, default_fragment_size};
use crate::mdf::Mdf;
use crate::types::Value;
use crate::{Error, Result};

/// Geometry and conversion of one channel, as stored in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChannel {
    pub name: String,
    /// Physical unit, empty if none.
    pub unit: String,
    pub data_type: DataType,
    /// Bit offset within the record, low 16 bits.
    pub start_offset: u16,
    /// Whole-byte extension of `start_offset`.
    pub additional_byte_offset: u16,
    pub bit_count: u16,
    pub is_master: bool,
    pub conversion: Option<ConversionBlock>,
}

/// One channel group's layout plus the physical location of its records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChannelGroup {
    pub record_id: u16,
    /// 0 for sorted groups; 1 or 2 when records carry ID bytes.
    pub record_id_len: u16,
    /// Bare record size, excluding ID bytes.
    pub record_size: u16,
    pub record_count: u32,
    /// Absolute file offset of the owning data group's record region.
    pub data_offset: u64,
    /// Stored size of that region, ID bytes included.
    pub data_size: u64,
    /// Record sizes of every group sharing the region, keyed by record ID.
    pub record_sizes: Vec<(u16, u16)>,
    pub channels: Vec<IndexedChannel>,
}

/// A serializable index over one MDF3 file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MdfIndex {
    /// Size of the indexed file, for validation.
    pub file_size: u64,
    pub channel_groups: Vec<IndexedChannelGroup>,
}

/// Ranged reads from an arbitrary byte source.
pub trait ByteRangeReader {
    type Error;

    fn read_range(
        &mut self,
        offset: u64,
        length: u64,
    ) -> core::result::Result<Vec<u8>, Self::Error>;
}

/// Local file backend for [`ByteRangeReader`].
pub struct FileRangeReader {
    file: File,
}

impl FileRangeReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Ok(FileRangeReader {
            file: File::open(path)?,
        })
    }
}

impl ByteRangeReader for FileRangeReader {
    type Error = Error;

    fn read_range(
        &mut self,
        offset: u64,
        length: u64,
    ) -> core::result::Result<Vec<u8>, Self::Error> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; length as usize];
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }
}

impl MdfIndex {
    /// Build an index by parsing a file's block graph once.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mdf = Mdf::open(path)?;
        let file_size = std::fs::metadata(path)?.len();

        let mut channel_groups = Vec::new();
        for data_group in &mdf.data_groups {
            let data_offset = data_group.extents.first().map(|e| e.address).unwrap_or(0);
            let data_size: u64 = data_group.extents.iter().map(|e| e.length).sum();
            let record_sizes: Vec<(u16, u16)> = data_group
                .channel_groups
                .iter()
                .map(|cg| (cg.block.record_id, cg.block.record_size))
                .collect();

            for cg in &data_group.channel_groups {
                let channels = cg
                    .channels
                    .iter()
                    .map(|ch| IndexedChannel {
                        name: ch.display_name().to_string(),
                        unit: ch.unit().to_string(),
                        data_type: ch.data_type,
                        start_offset: ch.start_offset,
                        additional_byte_offset: ch.additional_byte_offset,
                        bit_count: ch.bit_count,
                        is_master: ch.is_master(),
                        conversion: ch.conversion.clone(),
                    })
                    .collect();
                channel_groups.push(IndexedChannelGroup {
                    record_id: cg.block.record_id,
                    record_id_len: data_group.block.record_id_len,
                    record_size: cg.block.record_size,
                    record_count: cg.block.cycle_count,
                    data_offset,
                    data_size,
                    record_sizes: record_sizes.clone(),
                    channels,
                });
            }
        }

        Ok(MdfIndex {
            file_size,
            channel_groups,
        })
    }

    /// Save the index as JSON.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            Error::BlockSerializationError(format!("index serialization failed: {e}"))
        })?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a previously saved index.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| {
            Error::BlockSerializationError(format!("index deserialization failed: {e}"))
        })
    }

    /// (group index, record count, channel count) per channel group.
    pub fn list_channel_groups(&self) -> Vec<(usize, u32, usize)> {
        self.channel_groups
            .iter()
            .enumerate()
            .map(|(i, g)| (i, g.record_count, g.channels.len()))
            .collect()
    }

    /// (channel index, name, data type) for one group.
    pub fn list_channels(&self, group: usize) -> Option<Vec<(usize, &str, &DataType)>> {
        self.channel_groups.get(group).map(|g| {
            g.channels
                .iter()
                .enumerate()
                .map(|(i, ch)| (i, ch.name.as_str(), &ch.data_type))
                .collect()
        })
    }

    /// First occurrence of a channel name, in file order.
    pub fn find_channel_by_name(&self, name: &str) -> Option<(usize, usize)> {
        for (group, g) in self.channel_groups.iter().enumerate() {
            if let Some(index) = g.channels.iter().position(|ch| ch.name == name) {
                return Some((group, index));
            }
        }
        None
    }

    /// Read one channel's converted values through a range reader.
    pub fn read_channel_values<R: ByteRangeReader<Error = Error>>(
        &self,
        group: usize,
        index: usize,
        reader: &mut R,
    ) -> Result<Vec<Value>> {
        let g = self
            .channel_groups
            .get(group)
            .ok_or(Error::GroupIndexOutOfRange {
                group,
                count: self.channel_groups.len(),
            })?;
        let channel = g.channels.get(index).ok_or(Error::ChannelIndexOutOfRange {
            group,
            index,
            count: g.channels.len(),
        })?;
        if g.data_size == 0 {
            return Ok(Vec::new());
        }

        let data = reader.read_range(g.data_offset, g.data_size)?;
        let record_size = (g.record_size as usize).max(1);
        let record_sizes: HashMap<u16, usize> = g
            .record_sizes
            .iter()
            .map(|&(id, size)| (id, size as usize))
            .collect();
        let config = StreamConfig {
            record_size,
            record_id: g.record_id,
            record_id_len: g.record_id_len as usize,
            fragment_size: default_fragment_size(record_size),
            record_sizes: &record_sizes,
        };

        let mut values = Vec::new();
        for fragment in FragmentStream::memory(&data, &config) {
            let fragment = fragment?;
            decode_fragment(&fragment.bytes, record_size, channel, &mut values);
        }
        Ok(values)
    }

    /// Read a channel's values by name, resolving the first occurrence.
    pub fn read_channel_values_by_name<R: ByteRangeReader<Error = Error>>(
        &self,
        name: &str,
        reader: &mut R,
    ) -> Result<Vec<Value>> {
        let (group, index) = self
            .find_channel_by_name(name)
            .ok_or_else(|| Error::ChannelNotFound(name.to_string()))?;
        self.read_channel_values(group, index, reader)
    }
}

/// Decode one fragment of bare records into values, applying the channel's
/// conversion.
fn decode_fragment(
    bytes: &[u8],
    record_size: usize,
    channel: &IndexedChannel,
    values: &mut Vec<Value>,
) {
    let temp = ChannelBlock {
        start_offset: channel.start_offset,
        additional_byte_offset: channel.additional_byte_offset,
        bit_count: channel.bit_count,
        data_type: channel.data_type,
        ..ChannelBlock::default()
    };

    if channel.data_type.is_bytes_like() {
        let offset = (temp.start_bit() / 8) as usize;
        let width = (channel.bit_count as usize).div_ceil(8);
        for record in bytes.chunks_exact(record_size) {
            let end = (offset + width).min(record.len());
            let cell = if offset < end { &record[offset..end] } else { &[][..] };
            if channel.data_type == DataType::StringAscii {
                let len = cell.iter().position(|&b| b == 0).unwrap_or(cell.len());
                values.push(Value::String(cell[..len].iter().map(|&b| b as char).collect()));
            } else {
                values.push(Value::ByteArray(cell.to_vec()));
            }
        }
        return;
    }

    for bits in extract_bit_field(bytes, record_size, &temp) {
        let raw = match channel.data_type {
            DataType::FloatLE | DataType::FloatBE => {
                Value::Float(f32::from_bits(bits as u32) as f64)
            }
            DataType::DoubleLE | DataType::DoubleBE => Value::Float(f64::from_bits(bits)),
            DataType::SignedIntegerLE | DataType::SignedIntegerBE => {
                Value::SignedInteger(bits as i64)
            }
            _ => Value::UnsignedInteger(bits),
        };
        values.push(apply_conversion(channel.conversion.as_ref(), raw));
    }
}

fn apply_conversion(conversion: Option<&ConversionBlock>, raw: Value) -> Value {
    let Some(conversion) = conversion else {
        return raw;
    };
    let Some(raw_f64) = raw.as_f64() else {
        return raw;
    };
    if conversion.is_value_to_text() {
        match conversion.text_for(raw_f64) {
            Some(text) => Value::String(text.to_string()),
            None => raw,
        }
    } else if conversion.is_identity() {
        raw
    } else {
        Value::Float(conversion.convert(raw_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Samples, Signal};

    fn saved_sample_file() -> tempfile::NamedTempFile {
        let mut mdf = Mdf::new();
        let mut temperature = Signal::new(
            "temperature",
            Samples::Float(vec![21.5, 22.0, 22.5]),
            vec![0.0, 1.0, 2.0],
        );
        temperature.unit = String::from("degC");
        let counter = Signal::new(
            "counter",
            Samples::UnsignedInteger(vec![10, 20, 30]),
            vec![0.0, 1.0, 2.0],
        );
        mdf.append(&[temperature, counter]).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        mdf.save(file.path()).unwrap();
        file
    }

    #[test]
    fn index_lists_groups_and_channels() {
        let file = saved_sample_file();
        let index = MdfIndex::from_file(file.path()).unwrap();
        assert_eq!(index.list_channel_groups(), vec![(0, 3, 3)]);
        let channels = index.list_channels(0).unwrap();
        assert_eq!(channels[0].1, "time");
        assert_eq!(channels[1].1, "temperature");
        assert_eq!(channels[2].1, "counter");
        assert_eq!(index.find_channel_by_name("counter"), Some((0, 2)));
        assert_eq!(index.find_channel_by_name("missing"), None);
    }

    #[test]
    fn indexed_read_matches_written_samples() {
        let file = saved_sample_file();
        let index = MdfIndex::from_file(file.path()).unwrap();
        let mut reader = FileRangeReader::new(file.path()).unwrap();
        let values = index
            .read_channel_values_by_name("counter", &mut reader)
            .unwrap();
        assert_eq!(
            values,
            vec![
                Value::UnsignedInteger(10),
                Value::UnsignedInteger(20),
                Value::UnsignedInteger(30),
            ]
        );
        let values = index
            .read_channel_values_by_name("temperature", &mut reader)
            .unwrap();
        assert_eq!(
            values,
            vec![Value::Float(21.5), Value::Float(22.0), Value::Float(22.5)]
        );
    }

    #[test]
    fn index_json_roundtrip() {
        let file = saved_sample_file();
        let index = MdfIndex::from_file(file.path()).unwrap();
        let json_path = tempfile::NamedTempFile::new().unwrap();
        index.save_to_file(json_path.path()).unwrap();
        let loaded = MdfIndex::load_from_file(json_path.path()).unwrap();
        assert_eq!(loaded.file_size, index.file_size);
        assert_eq!(loaded.channel_groups.len(), 1);
        assert_eq!(loaded.channel_groups[0].channels.len(), 3);
        assert_eq!(loaded.find_channel_by_name("temperature"), Some((0, 1)));
    }

    #[test]
    fn out_of_range_selections_are_typed_errors() {
        let file = saved_sample_file();
        let index = MdfIndex::from_file(file.path()).unwrap();
        let mut reader = FileRangeReader::new(file.path()).unwrap();
        assert!(matches!(
            index.read_channel_values(5, 0, &mut reader),
            Err(Error::GroupIndexOutOfRange { group: 5, count: 1 })
        ));
        assert!(matches!(
            index.read_channel_values(0, 9, &mut reader),
            Err(Error::ChannelIndexOutOfRange { index: 9, .. })
        ));
    }
}

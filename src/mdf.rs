use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::bitfield::pack_bit_field;
use crate::blocks::{
    CHANNEL_TYPE_DATA, CHANNEL_TYPE_MASTER, ChannelBlock, ChannelGroupBlock, ConversionBlock,
    DataGroupBlock, DataType, HeaderBlock, IdentificationBlock, ProgramBlock,
};
use crate::fragment::{DataExtent, DataLocation};
use crate::parsing::{MdfFile, RawChannelGroup, RawDataGroup};
use crate::types::{Samples, Signal, Value};
use crate::{Error, Result};

/// An open MDF3 measurement file.
///
/// Channel groups are addressed by a flattened index: the ordinal of the
/// (data group, channel group) pair in file order. Channels are addressed
/// by name or by (group, index).
#[derive(Debug)]
pub struct Mdf {
    pub identification: IdentificationBlock,
    pub header: HeaderBlock,
    pub comment: Option<String>,
    pub program: Option<ProgramBlock>,
    pub(crate) data_groups: Vec<RawDataGroup>,
    /// Channel name to (flat group, channel index) occurrences, file order.
    pub(crate) channels_db: HashMap<String, Vec<(usize, usize)>>,
    pub(crate) source: Option<File>,
    pub(crate) source_path: Option<PathBuf>,
    /// Scratch file holding extended data not yet in the source.
    pub(crate) scratch: Option<NamedTempFile>,
    /// Decoded master arrays keyed by (flat group, fragment size,
    /// fragment offset).
    pub(crate) master_cache: HashMap<(usize, u64, u64), Vec<f64>>,
}

impl Default for Mdf {
    fn default() -> Self {
        Self::new()
    }
}

impl Mdf {
    /// Create an empty in-memory file.
    pub fn new() -> Self {
        Mdf {
            identification: IdentificationBlock::default(),
            header: HeaderBlock::default(),
            comment: None,
            program: None,
            data_groups: Vec::new(),
            channels_db: HashMap::new(),
            source: None,
            source_path: None,
            scratch: None,
            master_cache: HashMap::new(),
        }
    }

    /// Open a file from disk. Block metadata is parsed eagerly; raw record
    /// data stays in the file and is streamed on demand.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        let parsed = MdfFile::parse(&data, DataLocation::SourceFile)?;
        Ok(Self::from_parsed(parsed, Some(file), Some(path.to_path_buf())))
    }

    /// Parse a complete file image held in memory.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let parsed = MdfFile::parse(data, DataLocation::Memory)?;
        Ok(Self::from_parsed(parsed, None, None))
    }

    fn from_parsed(parsed: MdfFile, source: Option<File>, source_path: Option<PathBuf>) -> Self {
        let channels_db = index_channels(&parsed.data_groups);
        Mdf {
            identification: parsed.identification,
            header: parsed.header,
            comment: parsed.comment,
            program: parsed.program,
            data_groups: parsed.data_groups,
            channels_db,
            source,
            source_path,
            scratch: None,
            master_cache: HashMap::new(),
        }
    }

    /// Number of channel groups (flattened across data groups).
    pub fn group_count(&self) -> usize {
        self.data_groups.iter().map(|dg| dg.channel_groups.len()).sum()
    }

    /// Flat group index to (data group, channel group) indices.
    pub(crate) fn flat_groups(&self) -> Vec<(usize, usize)> {
        let mut flat = Vec::new();
        for (dg, group) in self.data_groups.iter().enumerate() {
            for cg in 0..group.channel_groups.len() {
                flat.push((dg, cg));
            }
        }
        flat
    }

    /// The channel group at a flat index.
    pub fn channel_group(&self, group: usize) -> Result<&RawChannelGroup> {
        let flat = self.flat_groups();
        let &(dg, cg) = flat.get(group).ok_or(Error::GroupIndexOutOfRange {
            group,
            count: flat.len(),
        })?;
        Ok(&self.data_groups[dg].channel_groups[cg])
    }

    /// All channel names in file order, duplicates included.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for group in &self.data_groups {
            for cg in &group.channel_groups {
                for ch in &cg.channels {
                    names.push(ch.display_name().to_string());
                }
            }
        }
        names
    }

    pub fn contains_channel(&self, name: &str) -> bool {
        self.channels_db.contains_key(name)
    }

    /// Resolve a channel name to its first occurrence.
    pub(crate) fn locate(&self, name: &str) -> Result<(usize, usize)> {
        self.channels_db
            .get(name)
            .and_then(|occurrences| occurrences.first())
            .copied()
            .ok_or_else(|| Error::ChannelNotFound(name.to_string()))
    }

    /// Validate a (group, index) pair against the file.
    pub(crate) fn validate_selection(&self, group: usize, index: usize) -> Result<()> {
        let cg = self.channel_group(group)?;
        if index >= cg.channels.len() {
            return Err(Error::ChannelIndexOutOfRange {
                group,
                index,
                count: cg.channels.len(),
            });
        }
        Ok(())
    }

    /// Append a new data group holding `signals`, all sharing the first
    /// signal's timestamps as the master channel.
    ///
    /// The group is memory-resident until the next [`save`](Mdf::save).
    pub fn append(&mut self, signals: &[Signal]) -> Result<()> {
        if signals.is_empty() {
            return Err(Error::UnsupportedOperation(String::from(
                "append requires at least one signal",
            )));
        }
        let cycle_count = signals[0].timestamps.len();
        for signal in signals {
            if signal.samples.len() != cycle_count || signal.timestamps.len() != cycle_count {
                return Err(Error::UnsupportedOperation(format!(
                    "signal '{}' length differs from the master's {cycle_count} samples",
                    signal.name
                )));
            }
            if matches!(signal.samples, Samples::Composite { .. }) {
                return Err(Error::UnsupportedOperation(String::from(
                    "composite samples cannot be appended directly",
                )));
            }
        }

        // Master first, then one byte-aligned field per signal
        let mut channels = vec![master_channel()];
        let mut offset_bytes = 8usize;
        for signal in signals {
            let (data_type, width) = storage_of(&signal.samples);
            channels.push(data_channel(signal, data_type, width, offset_bytes)?);
            offset_bytes += width;
        }
        let record_size = offset_bytes;
        if record_size > u16::MAX as usize {
            return Err(Error::UnsupportedOperation(format!(
                "record size {record_size} exceeds the format's 16-bit limit"
            )));
        }

        let mut data = Vec::with_capacity(record_size * cycle_count);
        for row in 0..cycle_count {
            data.extend_from_slice(&signals[0].timestamps[row].to_le_bytes());
            for signal in signals {
                encode_cell(&mut data, &signal.samples, row);
            }
        }

        let cg_block = ChannelGroupBlock {
            channel_count: channels.len() as u16,
            record_size: record_size as u16,
            cycle_count: cycle_count as u32,
            ..ChannelGroupBlock::default()
        };
        let dg_block = DataGroupBlock {
            cg_count: 1,
            ..DataGroupBlock::default()
        };
        let dep_slots = vec![None; channels.len()];
        self.data_groups.push(RawDataGroup {
            block: dg_block,
            channel_groups: vec![RawChannelGroup::new(cg_block, channels, dep_slots)],
            trigger: None,
            location: DataLocation::Memory,
            data,
            extents: Vec::new(),
        });

        self.header.dg_count = self.data_groups.len() as u16;
        self.channels_db = index_channels(&self.data_groups);
        self.master_cache.clear();
        Ok(())
    }

    /// Append `timestamps.len()` more records to an existing group.
    /// `columns` supply values for every non-master channel, in channel
    /// order.
    pub fn extend(
        &mut self,
        group: usize,
        timestamps: &[f64],
        columns: &[Samples],
    ) -> Result<()> {
        let flat = self.flat_groups();
        let &(dg, cg) = flat.get(group).ok_or(Error::GroupIndexOutOfRange {
            group,
            count: flat.len(),
        })?;
        if !self.data_groups[dg].is_sorted() {
            return Err(Error::UnsupportedOperation(String::from(
                "cannot extend an unsorted (multiplexed) data group",
            )));
        }

        let rows = {
            let channel_group = &self.data_groups[dg].channel_groups[cg];
            encode_rows(channel_group, timestamps, columns)?
        };

        // Write the new rows to the group's storage.
        let Mdf {
            data_groups,
            source,
            scratch,
            ..
        } = self;
        let data_group = &mut data_groups[dg];
        match data_group.location {
            DataLocation::Memory => data_group.data.extend_from_slice(&rows),
            DataLocation::SourceFile | DataLocation::ScratchFile => {
                migrate_to_scratch(data_group, source, scratch, &rows)?;
            }
        }

        let channel_group = &mut data_group.channel_groups[cg];
        channel_group.block.cycle_count += timestamps.len() as u32;
        channel_group.invalidate_layout();
        self.master_cache.clear();
        Ok(())
    }
}

/// Build the name -> occurrences index, preserving file order so lookups
/// resolve to the first occurrence.
pub(crate) fn index_channels(
    data_groups: &[RawDataGroup],
) -> HashMap<String, Vec<(usize, usize)>> {
    let mut db: HashMap<String, Vec<(usize, usize)>> = HashMap::new();
    let mut flat = 0usize;
    for group in data_groups {
        for cg in &group.channel_groups {
            for (index, ch) in cg.channels.iter().enumerate() {
                db.entry(ch.display_name().to_string())
                    .or_default()
                    .push((flat, index));
            }
            flat += 1;
        }
    }
    db
}

fn master_channel() -> ChannelBlock {
    ChannelBlock {
        channel_type: CHANNEL_TYPE_MASTER,
        short_name: String::from("time"),
        name: Some(String::from("time")),
        bit_count: 64,
        data_type: DataType::DoubleLE,
        conversion: Some(ConversionBlock::identity("s")),
        ..ChannelBlock::default()
    }
}

fn data_channel(
    signal: &Signal,
    data_type: DataType,
    width: usize,
    offset_bytes: usize,
) -> Result<ChannelBlock> {
    let start_bit = offset_bytes * 8;
    let (start_offset, additional) = if start_bit <= u16::MAX as usize {
        (start_bit as u16, 0)
    } else {
        (0, offset_bytes as u16)
    };
    let mut short_name: String = signal.name.chars().take(31).collect();
    short_name.shrink_to_fit();
    Ok(ChannelBlock {
        channel_type: CHANNEL_TYPE_DATA,
        short_name,
        name: Some(signal.name.clone()),
        description: signal.comment.chars().take(127).collect(),
        start_offset,
        additional_byte_offset: additional,
        bit_count: (width * 8) as u16,
        data_type,
        conversion: (!signal.unit.is_empty())
            .then(|| ConversionBlock::identity(&signal.unit)),
        ..ChannelBlock::default()
    })
}

/// Pick the on-disk type and byte width for an appended sample column.
fn storage_of(samples: &Samples) -> (DataType, usize) {
    match samples {
        Samples::UnsignedInteger(_) => (DataType::UnsignedIntegerLE, 8),
        Samples::SignedInteger(_) => (DataType::SignedIntegerLE, 8),
        Samples::Float(_) => (DataType::DoubleLE, 8),
        Samples::String(values) => {
            let width = values.iter().map(|s| s.len()).max().unwrap_or(0).max(1);
            (DataType::StringAscii, width)
        }
        Samples::ByteArray(values) => {
            let width = values.iter().map(|b| b.len()).max().unwrap_or(0).max(1);
            (DataType::ByteArray, width)
        }
        Samples::Composite { .. } => (DataType::ByteArray, 1),
    }
}

/// Append one sample's encoded bytes to `data` (appended groups use
/// byte-aligned fields only).
fn encode_cell(data: &mut Vec<u8>, samples: &Samples, row: usize) {
    let (_, width) = storage_of(samples);
    match samples {
        Samples::UnsignedInteger(v) => data.extend_from_slice(&v[row].to_le_bytes()),
        Samples::SignedInteger(v) => data.extend_from_slice(&v[row].to_le_bytes()),
        Samples::Float(v) => data.extend_from_slice(&v[row].to_le_bytes()),
        Samples::String(v) => {
            let bytes: Vec<u8> = v[row]
                .chars()
                .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
                .collect();
            data.extend_from_slice(&bytes[..bytes.len().min(width)]);
            data.resize(data.len() + width - bytes.len().min(width), 0);
        }
        Samples::ByteArray(v) => {
            let bytes = &v[row];
            data.extend_from_slice(&bytes[..bytes.len().min(width)]);
            data.resize(data.len() + width - bytes.len().min(width), 0);
        }
        Samples::Composite { .. } => {}
    }
}

/// Encode `timestamps.len()` records against an existing group's channel
/// geometry (master gets the timestamps, `columns` fill the rest in
/// channel order).
fn encode_rows(
    channel_group: &RawChannelGroup,
    timestamps: &[f64],
    columns: &[Samples],
) -> Result<Vec<u8>> {
    let record_size = channel_group.record_size();
    let master = channel_group.master_index();
    let data_channels: Vec<usize> = (0..channel_group.channels.len())
        .filter(|&i| Some(i) != master)
        .collect();
    if columns.len() != data_channels.len() {
        return Err(Error::UnsupportedOperation(format!(
            "expected {} columns, got {}",
            data_channels.len(),
            columns.len()
        )));
    }
    for column in columns {
        if column.len() != timestamps.len() {
            return Err(Error::UnsupportedOperation(format!(
                "column length {} differs from {} timestamps",
                column.len(),
                timestamps.len()
            )));
        }
    }

    let mut rows = vec![0u8; record_size * timestamps.len()];
    for (row, chunk) in rows.chunks_mut(record_size).enumerate() {
        if let Some(master_index) = master {
            let ch = &channel_group.channels[master_index];
            encode_value(chunk, ch, &Value::Float(timestamps[row]));
        }
        for (column, &ch_index) in columns.iter().zip(&data_channels) {
            let ch = &channel_group.channels[ch_index];
            if let Some(value) = column.value(row) {
                encode_value(chunk, ch, &value);
            }
        }
    }
    Ok(rows)
}

/// Write one value into a record at the channel's declared bit position.
fn encode_value(record: &mut [u8], ch: &ChannelBlock, value: &Value) {
    let start_bit = ch.start_bit() as usize;
    if ch.data_type.is_bytes_like() {
        let offset = start_bit / 8;
        let width = (ch.bit_count as usize).div_ceil(8);
        let bytes: Vec<u8> = match value {
            Value::String(s) => s
                .chars()
                .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
                .collect(),
            Value::ByteArray(b) => b.clone(),
            _ => Vec::new(),
        };
        let end = (offset + width).min(record.len());
        if offset < end {
            for (i, slot) in record[offset..end].iter_mut().enumerate() {
                *slot = bytes.get(i).copied().unwrap_or(0);
            }
        }
        return;
    }

    let pattern = if ch.data_type.is_float() {
        let f = value.as_f64().unwrap_or(0.0);
        if ch.bit_count == 32 {
            (f as f32).to_bits() as u64
        } else {
            f.to_bits()
        }
    } else {
        match value {
            Value::UnsignedInteger(v) => *v,
            Value::SignedInteger(v) => *v as u64,
            Value::Float(f) => *f as i64 as u64,
            _ => 0,
        }
    };
    pack_bit_field(
        record,
        start_bit,
        ch.bit_count as u32,
        pattern,
        ch.data_type.is_big_endian(),
    );
}

/// Move a file-backed group's raw data (plus `new_rows`) into the scratch
/// file, leaving the group scratch-resident with one extent.
fn migrate_to_scratch(
    data_group: &mut RawDataGroup,
    source: &mut Option<File>,
    scratch: &mut Option<NamedTempFile>,
    new_rows: &[u8],
) -> Result<()> {
    let mut existing = Vec::new();
    {
        let stream: &mut dyn crate::fragment::ReadSeek = match data_group.location {
            DataLocation::SourceFile => source.as_mut().ok_or_else(|| {
                Error::UnsupportedOperation(String::from("data group has no backing file"))
            })?,
            DataLocation::ScratchFile => scratch
                .as_mut()
                .map(|t| t.as_file_mut())
                .ok_or_else(|| {
                    Error::UnsupportedOperation(String::from("data group has no scratch file"))
                })?,
            DataLocation::Memory => unreachable!("memory groups extend in place"),
        };
        for extent in &data_group.extents {
            let start = existing.len();
            existing.resize(start + extent.length as usize, 0);
            stream.seek(SeekFrom::Start(extent.address))?;
            stream.read_exact(&mut existing[start..])?;
        }
    }

    if scratch.is_none() {
        *scratch = Some(NamedTempFile::new()?);
    }
    let file = match scratch.as_mut() {
        Some(t) => t.as_file_mut(),
        None => unreachable!("scratch created above"),
    };
    let start = file.seek(SeekFrom::End(0))?;
    file.write_all(&existing)?;
    file.write_all(new_rows)?;

    data_group.location = DataLocation::ScratchFile;
    data_group.extents = vec![DataExtent {
        address: start,
        length: (existing.len() + new_rows.len()) as u64,
    }];
    data_group.data.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signals() -> Vec<Signal> {
        let mut speed = Signal::new(
            "speed",
            Samples::Float(vec![0.0, 10.0, 20.0]),
            vec![0.0, 0.5, 1.0],
        );
        speed.unit = String::from("km/h");
        let gear = Signal::new(
            "gear",
            Samples::UnsignedInteger(vec![1, 2, 3]),
            vec![0.0, 0.5, 1.0],
        );
        vec![speed, gear]
    }

    #[test]
    fn append_builds_a_memory_group() {
        let mut mdf = Mdf::new();
        mdf.append(&sample_signals()).unwrap();
        assert_eq!(mdf.group_count(), 1);
        let cg = mdf.channel_group(0).unwrap();
        assert_eq!(cg.channels.len(), 3);
        assert_eq!(cg.cycle_count(), 3);
        assert_eq!(cg.record_size(), 24);
        assert!(mdf.contains_channel("speed"));
        assert!(mdf.contains_channel("time"));
        assert_eq!(mdf.data_groups[0].data.len(), 72);
    }

    #[test]
    fn append_rejects_mismatched_lengths() {
        let mut mdf = Mdf::new();
        let bad = vec![
            Signal::new("a", Samples::Float(vec![1.0]), vec![0.0]),
            Signal::new("b", Samples::Float(vec![1.0, 2.0]), vec![0.0, 1.0]),
        ];
        assert!(matches!(
            mdf.append(&bad),
            Err(Error::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn extend_memory_group_in_place() {
        let mut mdf = Mdf::new();
        mdf.append(&sample_signals()).unwrap();
        mdf.extend(
            0,
            &[1.5, 2.0],
            &[
                Samples::Float(vec![30.0, 40.0]),
                Samples::UnsignedInteger(vec![4, 5]),
            ],
        )
        .unwrap();
        let cg = mdf.channel_group(0).unwrap();
        assert_eq!(cg.cycle_count(), 5);
        assert_eq!(mdf.data_groups[0].data.len(), 120);
    }

    #[test]
    fn extend_validates_column_count() {
        let mut mdf = Mdf::new();
        mdf.append(&sample_signals()).unwrap();
        let result = mdf.extend(0, &[1.5], &[Samples::Float(vec![30.0])]);
        assert!(matches!(result, Err(Error::UnsupportedOperation(_))));
    }

    #[test]
    fn string_cell_is_clamped_to_the_record_end() {
        // 4-byte string declared where only 2 bytes of record remain
        let mut record = [0u8; 4];
        let ch = ChannelBlock {
            start_offset: 16,
            bit_count: 32,
            data_type: DataType::StringAscii,
            ..ChannelBlock::default()
        };
        encode_value(&mut record, &ch, &Value::String(String::from("abcd")));
        assert_eq!(record, [0, 0, b'a', b'b']);
    }

    #[test]
    fn unknown_group_is_a_typed_error() {
        let mdf = Mdf::new();
        assert!(matches!(
            mdf.channel_group(3),
            Err(Error::GroupIndexOutOfRange { group: 3, count: 0 })
        ));
    }

    #[test]
    fn duplicate_names_keep_file_order() {
        let mut mdf = Mdf::new();
        mdf.append(&sample_signals()).unwrap();
        mdf.append(&sample_signals()).unwrap();
        let occurrences = &mdf.channels_db["speed"];
        assert_eq!(occurrences.len(), 2);
        assert_eq!(occurrences[0], (0, 1));
        assert_eq!(occurrences[1], (1, 1));
    }
}

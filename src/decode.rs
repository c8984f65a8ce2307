//! Sample decoding: turns a channel selection into decoded, physically
//! converted sample arrays.
//!
//! Scalar channels resolve through the group's record layout where
//! possible and fall back to the bit-level extractor otherwise. Array and
//! structure channels decode their component channels recursively. Master
//! (time) arrays are decoded once per (group, fragment size, fragment
//! offset) and cached; keying on the fragment size keeps decodes with
//! different fragment size hints from reading each other's entries.

use std::collections::HashMap;
use std::fs::File;

use tempfile::NamedTempFile;

use crate::bitfield::extract_bit_field;
use crate::blocks::{ChannelBlock, DataType};
use crate::fragment::{
    DataLocation, FragmentStream, StreamConfig, default_fragment_size,
};
use crate::layout::RecordLayout;
use crate::mdf::Mdf;
use crate::parsing::{RawChannelGroup, RawDataGroup};
use crate::types::{Samples, Signal};
use crate::{Error, Result};

/// Options for one decode request.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Resample onto a uniform grid with this step, in master units.
    pub raster: Option<f64>,
    /// Skip the conversion stage and return raw decoded values.
    pub raw: bool,
    /// Target fragment byte size; derived from the record size if unset.
    pub fragment_size: Option<usize>,
    /// Sample period for the synthetic master of groups without a time
    /// channel. Defaults to 1.0 (plain record indices).
    pub virtual_master_period: Option<f64>,
}

// Guard against cyclic dependency graphs in malformed files.
const MAX_DEPENDENCY_DEPTH: usize = 16;

impl Mdf {
    /// Decode a channel by name; duplicate names resolve to the first
    /// occurrence in file order.
    pub fn get(&mut self, name: &str, options: &DecodeOptions) -> Result<Signal> {
        let (group, index) = self.locate(name)?;
        self.get_at(group, index, options)
    }

    /// Decode a channel by (flat group, channel index).
    pub fn get_at(&mut self, group: usize, index: usize, options: &DecodeOptions) -> Result<Signal> {
        self.validate_selection(group, index)?;
        let (samples, master) = self.decode(group, index, options)?;
        let (samples, timestamps) = match options.raster {
            Some(raster) if raster > 0.0 && master.len() > 1 => {
                resample(samples, &master, raster)
            }
            _ => (samples, master),
        };
        let cg = self.channel_group(group)?;
        let ch = &cg.channels[index];
        Ok(Signal {
            name: ch.display_name().to_string(),
            unit: ch.unit().to_string(),
            comment: ch.description.clone(),
            samples,
            timestamps,
        })
    }

    /// The master (time) array of a group. Groups without a master channel
    /// get a synthetic index-based array scaled by
    /// [`DecodeOptions::virtual_master_period`].
    pub fn get_master(&mut self, group: usize, options: &DecodeOptions) -> Result<Vec<f64>> {
        let (master_index, cycle_count) = {
            let cg = self.channel_group(group)?;
            (cg.master_index(), cg.cycle_count())
        };
        match master_index {
            Some(index) => {
                let (_, master) = self.decode(group, index, options)?;
                Ok(master)
            }
            None => {
                let period = options.virtual_master_period.unwrap_or(1.0);
                Ok((0..cycle_count).map(|i| i as f64 * period).collect())
            }
        }
    }

    fn decode(
        &mut self,
        group: usize,
        index: usize,
        options: &DecodeOptions,
    ) -> Result<(Samples, Vec<f64>)> {
        let flat = self.flat_groups();
        let Mdf {
            data_groups,
            source,
            scratch,
            master_cache,
            ..
        } = self;
        let mut ctx = DecodeCtx {
            data_groups,
            flat: &flat,
            source,
            scratch,
            master_cache,
            fragment_size: options.fragment_size,
            virtual_master_period: options.virtual_master_period,
        };
        decode_channel(&mut ctx, group, index, options.raw, 0)
    }
}

struct DecodeCtx<'a> {
    data_groups: &'a [RawDataGroup],
    flat: &'a [(usize, usize)],
    source: &'a mut Option<File>,
    scratch: &'a mut Option<NamedTempFile>,
    master_cache: &'a mut HashMap<(usize, u64, u64), Vec<f64>>,
    fragment_size: Option<usize>,
    virtual_master_period: Option<f64>,
}

fn decode_channel(
    ctx: &mut DecodeCtx<'_>,
    group: usize,
    index: usize,
    raw: bool,
    depth: usize,
) -> Result<(Samples, Vec<f64>)> {
    if depth > MAX_DEPENDENCY_DEPTH {
        return Err(Error::BlockLinkError(String::from(
            "channel dependency chain too deep",
        )));
    }
    let data_groups = ctx.data_groups;
    let &(dg_index, cg_index) = ctx.flat.get(group).ok_or(Error::GroupIndexOutOfRange {
        group,
        count: ctx.flat.len(),
    })?;
    let data_group = &data_groups[dg_index];
    let channel_group = &data_group.channel_groups[cg_index];
    let channel = channel_group
        .channels
        .get(index)
        .ok_or(Error::ChannelIndexOutOfRange {
            group,
            index,
            count: channel_group.channels.len(),
        })?;

    // Array/structure channels assemble from their components.
    if let Some(dependency) = channel_group.dependencies[index].as_ref().cloned() {
        let mut columns = Vec::with_capacity(dependency.refs.len());
        for (ref_group, ref_index) in dependency.refs {
            let (column, _) = decode_channel(ctx, ref_group, ref_index, raw, depth + 1)?;
            columns.push(column);
        }
        let samples = Samples::Composite {
            dims: dependency.dims,
            columns,
        };
        let (_, master) = match channel_group.master_index() {
            Some(master_index) if master_index != index => {
                decode_channel(ctx, group, master_index, false, depth + 1)?
            }
            _ => {
                let period = ctx.virtual_master_period.unwrap_or(1.0);
                let n = channel_group.cycle_count();
                let master: Vec<f64> = (0..n).map(|i| i as f64 * period).collect();
                (Samples::Float(master.clone()), master)
            }
        };
        return Ok((samples, master));
    }

    // Scalar path: stream fragments and decode per fragment.
    let layout = channel_group.layout();
    let record_size = channel_group.record_size().max(1);
    let master_index = channel_group.master_index();
    let record_sizes = data_group.record_sizes();
    let fragment_size = ctx
        .fragment_size
        .unwrap_or_else(|| default_fragment_size(record_size));
    let config = StreamConfig {
        record_size,
        record_id: channel_group.block.record_id,
        record_id_len: data_group.block.record_id_len as usize,
        fragment_size,
        record_sizes: &record_sizes,
    };
    let stream = match data_group.location {
        DataLocation::Memory => FragmentStream::memory(&data_group.data, &config),
        DataLocation::SourceFile => {
            let file = ctx.source.as_mut().ok_or_else(|| {
                Error::UnsupportedOperation(String::from("data group has no backing file"))
            })?;
            FragmentStream::file(file, data_group.extents.clone(), &config)
        }
        DataLocation::ScratchFile => {
            let file = ctx.scratch.as_mut().map(|t| t.as_file_mut()).ok_or_else(|| {
                Error::UnsupportedOperation(String::from("data group has no scratch file"))
            })?;
            FragmentStream::file(file, data_group.extents.clone(), &config)
        }
    };

    let mut samples: Option<Samples> = None;
    let mut master: Vec<f64> = Vec::new();
    for fragment in stream {
        let fragment = fragment?;
        let column = decode_column(&fragment.bytes, channel_group, &layout, index);
        match &mut samples {
            Some(acc) => acc.append(column),
            None => samples = Some(column),
        }

        // Fragment boundaries depend on the fragment size, so entries
        // cached under one size never match the offsets of another.
        let key = (group, fragment_size as u64, fragment.offset);
        if let Some(cached) = ctx.master_cache.get(&key) {
            master.extend_from_slice(cached);
        } else {
            let values = match master_index {
                Some(mi) => master_values(&fragment.bytes, channel_group, &layout, mi),
                None => {
                    let start = fragment.offset as usize / record_size;
                    let count = fragment.bytes.len() / record_size;
                    let period = ctx.virtual_master_period.unwrap_or(1.0);
                    (start..start + count).map(|i| i as f64 * period).collect()
                }
            };
            master.extend_from_slice(&values);
            ctx.master_cache.insert(key, values);
        }
    }

    let mut samples = samples.unwrap_or_else(|| empty_samples(channel));
    if !raw {
        if let Some(conversion) = &channel.conversion {
            // Value-to-text tables keep raw values; their semantics are
            // lookup, not arithmetic. Identity conversions only carry a
            // unit and must not widen integer columns to float.
            if !conversion.is_value_to_text() && !conversion.is_identity() {
                samples = conversion.convert_samples(&samples);
            }
        }
    }
    Ok((samples, master))
}

/// Decode one channel's column from a buffer of bare records. Pure; no
/// I/O, no caching.
fn decode_column(
    bytes: &[u8],
    channel_group: &RawChannelGroup,
    layout: &RecordLayout,
    index: usize,
) -> Samples {
    let channel = &channel_group.channels[index];
    let record_size = channel_group.record_size().max(1);
    let count = bytes.len() / record_size;

    if channel.data_type.is_bytes_like() {
        let offset = (channel.start_bit() / 8) as usize;
        let width = (channel.bit_count as usize).div_ceil(8);
        let mut strings = Vec::with_capacity(count);
        let mut arrays = Vec::with_capacity(count);
        for r in 0..count {
            let record = &bytes[r * record_size..(r + 1) * record_size];
            let end = (offset + width).min(record.len());
            let cell = if offset < end { &record[offset..end] } else { &[][..] };
            if channel.data_type == DataType::StringAscii {
                let len = cell.iter().position(|&b| b == 0).unwrap_or(cell.len());
                strings.push(cell[..len].iter().map(|&b| b as char).collect());
            } else {
                arrays.push(cell.to_vec());
            }
        }
        return if channel.data_type == DataType::StringAscii {
            Samples::String(strings)
        } else {
            Samples::ByteArray(arrays)
        };
    }

    let bits = match layout.parent(index) {
        // Fields wider than 8 bytes (string parents) exceed the fold
        // accumulator; those channels take the bit-level path.
        Some(parent) if layout.fields[parent.field].bytes <= 8 => {
            let field = &layout.fields[parent.field];
            let bit_count = (channel.bit_count as u32).min(64);
            let mask: u64 = if bit_count >= 64 {
                u64::MAX
            } else if bit_count == 0 {
                0
            } else {
                (1u64 << bit_count) - 1
            };
            let big_endian = channel.data_type.is_big_endian();
            let signed = channel.data_type.is_signed();
            let mut values = Vec::with_capacity(count);
            for r in 0..count {
                let record = &bytes[r * record_size..(r + 1) * record_size];
                let mut acc: u64 = 0;
                for i in 0..field.bytes {
                    let byte = record.get(field.offset + i).copied().unwrap_or(0) as u64;
                    if big_endian {
                        acc = (acc << 8) | byte;
                    } else {
                        acc |= byte << (8 * i);
                    }
                }
                let mut value = (acc >> parent.bit_shift) & mask;
                if signed && bit_count > 0 && bit_count < 64 && (value >> (bit_count - 1)) & 1 == 1
                {
                    value |= u64::MAX << bit_count;
                }
                values.push(value);
            }
            values
        }
        // Dropped by the layout builder: bit-level fallback
        _ => extract_bit_field(bytes, record_size, channel),
    };
    samples_from_bits(bits, channel.data_type)
}

/// Master column of one fragment, converted to seconds (f64).
fn master_values(
    bytes: &[u8],
    channel_group: &RawChannelGroup,
    layout: &RecordLayout,
    master_index: usize,
) -> Vec<f64> {
    let column = decode_column(bytes, channel_group, layout, master_index);
    let len = column.len();
    let channel = &channel_group.channels[master_index];
    let converted = match &channel.conversion {
        Some(conversion) if !conversion.is_value_to_text() => conversion.convert_samples(&column),
        _ => column,
    };
    converted.as_f64_vec().unwrap_or_else(|| vec![0.0; len])
}

fn samples_from_bits(bits: Vec<u64>, data_type: DataType) -> Samples {
    match data_type {
        DataType::FloatLE | DataType::FloatBE => {
            Samples::Float(bits.iter().map(|&b| f32::from_bits(b as u32) as f64).collect())
        }
        DataType::DoubleLE | DataType::DoubleBE => {
            Samples::Float(bits.iter().map(|&b| f64::from_bits(b)).collect())
        }
        DataType::SignedIntegerLE | DataType::SignedIntegerBE => {
            Samples::SignedInteger(bits.iter().map(|&b| b as i64).collect())
        }
        _ => Samples::UnsignedInteger(bits),
    }
}

fn empty_samples(channel: &ChannelBlock) -> Samples {
    match channel.data_type {
        DataType::StringAscii => Samples::String(Vec::new()),
        DataType::ByteArray => Samples::ByteArray(Vec::new()),
        DataType::FloatLE | DataType::FloatBE | DataType::DoubleLE | DataType::DoubleBE => {
            Samples::Float(Vec::new())
        }
        DataType::SignedIntegerLE | DataType::SignedIntegerBE => {
            Samples::SignedInteger(Vec::new())
        }
        _ => Samples::UnsignedInteger(Vec::new()),
    }
}

/// Resample a column and its master onto a uniform grid spanning
/// [first, last] with step `raster`. Floats interpolate linearly; integer,
/// text, and composite columns take the previous sample.
fn resample(samples: Samples, master: &[f64], raster: f64) -> (Samples, Vec<f64>) {
    let first = master[0];
    let last = master[master.len() - 1];
    let steps = ((last - first) / raster).floor() as usize;
    let grid: Vec<f64> = (0..=steps).map(|i| first + i as f64 * raster).collect();
    let resampled = resample_column(&samples, master, &grid);
    (resampled, grid)
}

fn resample_column(samples: &Samples, master: &[f64], grid: &[f64]) -> Samples {
    match samples {
        Samples::Float(values) => {
            let mut out = Vec::with_capacity(grid.len());
            let mut j = 0usize;
            for &t in grid {
                while j + 1 < master.len() && master[j + 1] <= t {
                    j += 1;
                }
                let v = if j + 1 < master.len() && master[j + 1] > master[j] {
                    let f = (t - master[j]) / (master[j + 1] - master[j]);
                    values[j] + f.clamp(0.0, 1.0) * (values[j + 1] - values[j])
                } else {
                    values[j]
                };
                out.push(v);
            }
            Samples::Float(out)
        }
        Samples::Composite { dims, columns } => Samples::Composite {
            dims: dims.clone(),
            columns: columns
                .iter()
                .map(|c| resample_column(c, master, grid))
                .collect(),
        },
        other => {
            // Previous-sample hold for non-interpolatable columns
            let mut out: Option<Samples> = None;
            let mut j = 0usize;
            for &t in grid {
                while j + 1 < master.len() && master[j + 1] <= t {
                    j += 1;
                }
                if let Some(value) = other.value(j) {
                    let single = match value {
                        crate::types::Value::UnsignedInteger(v) => {
                            Samples::UnsignedInteger(vec![v])
                        }
                        crate::types::Value::SignedInteger(v) => Samples::SignedInteger(vec![v]),
                        crate::types::Value::Float(v) => Samples::Float(vec![v]),
                        crate::types::Value::String(v) => Samples::String(vec![v]),
                        crate::types::Value::ByteArray(v) => Samples::ByteArray(vec![v]),
                    };
                    match &mut out {
                        Some(acc) => acc.append(single),
                        None => out = Some(single),
                    }
                }
            }
            out.unwrap_or_else(|| other.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{ChannelGroupBlock, DataGroupBlock};
    use crate::mdf::index_channels;
    use crate::types::Signal;

    fn channel(
        name: &str,
        start_offset: u16,
        bit_count: u16,
        data_type: DataType,
    ) -> ChannelBlock {
        ChannelBlock {
            short_name: name.to_string(),
            start_offset,
            bit_count,
            data_type,
            ..ChannelBlock::default()
        }
    }

    /// A synthetic one-group file with a raw memory data block.
    fn synthetic_mdf(channels: Vec<ChannelBlock>, record_size: u16, data: Vec<u8>) -> Mdf {
        let cycle_count = (data.len() / record_size as usize) as u32;
        let cg_block = ChannelGroupBlock {
            channel_count: channels.len() as u16,
            record_size,
            cycle_count,
            ..ChannelGroupBlock::default()
        };
        let deps = vec![None; channels.len()];
        let mut mdf = Mdf::new();
        mdf.data_groups.push(RawDataGroup {
            block: DataGroupBlock::default(),
            channel_groups: vec![RawChannelGroup::new(cg_block, channels, deps)],
            trigger: None,
            location: DataLocation::Memory,
            data,
            extents: Vec::new(),
        });
        mdf.channels_db = index_channels(&mdf.data_groups);
        mdf
    }

    #[test]
    fn packed_twelve_and_four_bit_channels() {
        let channels = vec![
            channel("low", 0, 12, DataType::UnsignedIntegerLE),
            channel("high", 12, 4, DataType::UnsignedIntegerLE),
        ];
        let mut mdf = synthetic_mdf(channels, 4, vec![0x34, 0x0B, 0x00, 0x00]);
        let options = DecodeOptions::default();
        let low = mdf.get("low", &options).unwrap();
        let high = mdf.get("high", &options).unwrap();
        assert_eq!(low.samples, Samples::UnsignedInteger(vec![0xB34]));
        assert_eq!(high.samples, Samples::UnsignedInteger(vec![0x0]));
    }

    #[test]
    fn virtual_master_counts_records() {
        let channels = vec![channel("v", 0, 8, DataType::UnsignedIntegerLE)];
        let mut mdf = synthetic_mdf(channels, 1, vec![5, 6, 7]);
        let options = DecodeOptions {
            virtual_master_period: Some(0.5),
            ..DecodeOptions::default()
        };
        let signal = mdf.get("v", &options).unwrap();
        assert_eq!(signal.timestamps, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn conversion_applies_unless_raw() {
        let mut ch = channel("temp", 0, 16, DataType::UnsignedIntegerLE);
        ch.conversion = Some(crate::blocks::ConversionBlock::linear(-40.0, 0.5));
        let mut mdf = synthetic_mdf(vec![ch], 2, vec![100, 0, 200, 0]);
        let physical = mdf.get("temp", &DecodeOptions::default()).unwrap();
        assert_eq!(physical.samples, Samples::Float(vec![10.0, 60.0]));
        let raw = mdf
            .get(
                "temp",
                &DecodeOptions {
                    raw: true,
                    ..DecodeOptions::default()
                },
            )
            .unwrap();
        assert_eq!(raw.samples, Samples::UnsignedInteger(vec![100, 200]));
    }

    #[test]
    fn unknown_channel_is_a_typed_error() {
        let mut mdf = Mdf::new();
        assert!(matches!(
            mdf.get("missing", &DecodeOptions::default()),
            Err(Error::ChannelNotFound(_))
        ));
    }

    #[test]
    fn append_then_get_roundtrip() {
        let mut mdf = Mdf::new();
        let mut rpm = Signal::new(
            "rpm",
            Samples::UnsignedInteger(vec![800, 1500, 3000]),
            vec![0.0, 0.1, 0.2],
        );
        rpm.unit = String::from("1/min");
        mdf.append(&[rpm]).unwrap();
        let signal = mdf.get("rpm", &DecodeOptions::default()).unwrap();
        assert_eq!(signal.samples, Samples::UnsignedInteger(vec![800, 1500, 3000]));
        assert_eq!(signal.timestamps, vec![0.0, 0.1, 0.2]);
        assert_eq!(signal.unit, "1/min");
    }

    #[test]
    fn duplicate_names_resolve_to_first_occurrence() {
        let mut mdf = Mdf::new();
        mdf.append(&[Signal::new(
            "x",
            Samples::Float(vec![1.0]),
            vec![0.0],
        )])
        .unwrap();
        mdf.append(&[Signal::new(
            "x",
            Samples::Float(vec![2.0]),
            vec![0.0],
        )])
        .unwrap();
        let signal = mdf.get("x", &DecodeOptions::default()).unwrap();
        assert_eq!(signal.samples, Samples::Float(vec![1.0]));
    }

    #[test]
    fn resampling_interpolates_floats() {
        let mut mdf = Mdf::new();
        mdf.append(&[Signal::new(
            "lin",
            Samples::Float(vec![0.0, 10.0]),
            vec![0.0, 1.0],
        )])
        .unwrap();
        let options = DecodeOptions {
            raster: Some(0.25),
            ..DecodeOptions::default()
        };
        let signal = mdf.get("lin", &options).unwrap();
        assert_eq!(signal.timestamps, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(signal.samples, Samples::Float(vec![0.0, 2.5, 5.0, 7.5, 10.0]));
    }

    #[test]
    fn resampling_holds_previous_integer_sample() {
        let mut mdf = Mdf::new();
        mdf.append(&[Signal::new(
            "step",
            Samples::UnsignedInteger(vec![1, 2]),
            vec![0.0, 1.0],
        )])
        .unwrap();
        let options = DecodeOptions {
            raster: Some(0.5),
            ..DecodeOptions::default()
        };
        let signal = mdf.get("step", &options).unwrap();
        assert_eq!(signal.samples, Samples::UnsignedInteger(vec![1, 1, 2]));
    }

    #[test]
    fn master_cache_fills_on_decode() {
        let mut mdf = Mdf::new();
        mdf.append(&[Signal::new(
            "a",
            Samples::Float(vec![1.0, 2.0]),
            vec![0.0, 1.0],
        )])
        .unwrap();
        mdf.get("a", &DecodeOptions::default()).unwrap();
        assert_eq!(mdf.master_cache.len(), 1);
        assert_eq!(mdf.master_cache.values().next().unwrap(), &vec![0.0, 1.0]);
    }

    #[test]
    fn fragment_size_hints_get_separate_cache_entries() {
        let mut mdf = Mdf::new();
        mdf.append(&[Signal::new(
            "a",
            Samples::Float(vec![1.0, 2.0]),
            vec![0.0, 1.0],
        )])
        .unwrap();
        let small = DecodeOptions {
            fragment_size: Some(16),
            ..DecodeOptions::default()
        };
        let large = DecodeOptions {
            fragment_size: Some(32),
            ..DecodeOptions::default()
        };
        let first = mdf.get("a", &small).unwrap();
        let second = mdf.get("a", &large).unwrap();
        assert_eq!(first.timestamps, second.timestamps);
        assert_eq!(mdf.master_cache.len(), 2);
    }

    #[test]
    fn extractor_fallback_for_overflowing_geometry() {
        // Declared 32-bit field at the last byte of a 2-byte record:
        // dropped by the layout, decoded by the extractor, zero-extended
        let channels = vec![
            channel("ok", 0, 8, DataType::UnsignedIntegerLE),
            channel("wide", 8, 32, DataType::UnsignedIntegerLE),
        ];
        let mut mdf = synthetic_mdf(channels, 2, vec![0x11, 0x7F]);
        let signal = mdf.get("wide", &DecodeOptions::default()).unwrap();
        assert_eq!(signal.samples, Samples::UnsignedInteger(vec![0x7F]));
    }

    #[test]
    fn signed_subfield_sign_extends_through_layout() {
        // 4-bit signed at bit 12 inside a u16 parent, value -1
        let channels = vec![
            channel("parent", 0, 12, DataType::UnsignedIntegerLE),
            channel("nibble", 12, 4, DataType::SignedIntegerLE),
        ];
        let mut mdf = synthetic_mdf(channels, 2, vec![0x00, 0xF0]);
        let signal = mdf.get("nibble", &DecodeOptions::default()).unwrap();
        assert_eq!(signal.samples, Samples::SignedInteger(vec![-1]));
    }
}

//! Lazy raw-record streaming.
//!
//! A [`FragmentStream`] yields bounded chunks of consecutive raw records
//! for one channel group, in increasing offset order. Fragments always
//! carry bare records: for unsorted (record-ID multiplexed) data groups the
//! stream demultiplexes by the leading ID byte and strips the IDs before
//! yielding.
//!
//! The stream is a plain iterator evaluated exactly once; consumers cancel
//! by dropping it. Downstream master caching is keyed by fragment offset,
//! so the ascending-offset order is part of the contract.

use std::borrow::Cow;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::mem;

use crate::{Error, Result};

/// Storage stream the file-backed paths read from.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Where a data group's raw bytes currently live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLocation {
    /// Fully resident in the group's own buffer.
    Memory,
    /// In the file the object was opened from.
    SourceFile,
    /// In a scratch temp file holding appended/extended data.
    ScratchFile,
}

/// One physical (address, length) span of raw record bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataExtent {
    pub address: u64,
    pub length: u64,
}

/// A chunk of consecutive bare records plus its cumulative byte offset
/// within the group's logical record stream.
#[derive(Debug)]
pub struct Fragment<'a> {
    pub bytes: Cow<'a, [u8]>,
    pub offset: u64,
}

/// Per-stream parameters. `record_sizes` maps record ID to bare record
/// size and is consulted only when `record_id_len > 0`.
#[derive(Debug, Clone)]
pub struct StreamConfig<'m> {
    pub record_size: usize,
    pub record_id: u16,
    /// 0 (sorted), 1, or 2 identifier bytes per physical record.
    pub record_id_len: usize,
    pub fragment_size: usize,
    pub record_sizes: &'m HashMap<u16, usize>,
}

/// Target fragment size in bytes, biased toward larger fragments as the
/// per-record size grows so wide records still batch usefully.
pub fn default_fragment_size(record_size: usize) -> usize {
    match record_size {
        0..=16 => 1 << 20,
        17..=256 => 4 << 20,
        257..=4096 => 8 << 20,
        _ => 32 << 20,
    }
}

pub struct FragmentStream<'a> {
    state: State<'a>,
}

enum State<'a> {
    /// Yields at most one fragment, then stays exhausted.
    Memory { pending: Option<Fragment<'a>> },
    Sorted {
        stream: &'a mut dyn ReadSeek,
        extents: Vec<DataExtent>,
        extent_index: usize,
        /// Bytes already consumed from the current extent.
        extent_pos: u64,
        carry: Vec<u8>,
        offset: u64,
        target: usize,
        record_size: usize,
    },
    Unsorted {
        stream: &'a mut dyn ReadSeek,
        extents: Vec<DataExtent>,
        extent_index: usize,
        offset: u64,
        record_id: u16,
        record_id_len: usize,
        record_sizes: HashMap<u16, usize>,
    },
}

impl<'a> FragmentStream<'a> {
    /// Stream over a memory-resident data group.
    pub fn memory(data: &'a [u8], config: &StreamConfig<'_>) -> Self {
        let pending = if data.is_empty() {
            None
        } else if config.record_id_len == 0 {
            Some(Fragment {
                bytes: Cow::Borrowed(data),
                offset: 0,
            })
        } else {
            let records = demux_records(
                data,
                config.record_id,
                config.record_id_len,
                config.record_sizes,
            );
            (!records.is_empty()).then_some(Fragment {
                bytes: Cow::Owned(records),
                offset: 0,
            })
        };
        FragmentStream {
            state: State::Memory { pending },
        }
    }

    /// Stream over a file-backed data group described by `extents`.
    pub fn file(
        stream: &'a mut dyn ReadSeek,
        extents: Vec<DataExtent>,
        config: &StreamConfig<'_>,
    ) -> Self {
        let state = if config.record_id_len == 0 {
            let record_size = config.record_size.max(1);
            State::Sorted {
                stream,
                extents,
                extent_index: 0,
                extent_pos: 0,
                carry: Vec::new(),
                offset: 0,
                // Whole-record multiple, at least one record per fragment
                target: (config.fragment_size / record_size).max(1) * record_size,
                record_size,
            }
        } else {
            State::Unsorted {
                stream,
                extents,
                extent_index: 0,
                offset: 0,
                record_id: config.record_id,
                record_id_len: config.record_id_len,
                record_sizes: config.record_sizes.clone(),
            }
        };
        FragmentStream { state }
    }
}

impl<'a> Iterator for FragmentStream<'a> {
    type Item = Result<Fragment<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            State::Memory { pending } => pending.take().map(Ok),
            State::Sorted {
                stream,
                extents,
                extent_index,
                extent_pos,
                carry,
                offset,
                target,
                record_size,
            } => {
                let mut buffer = mem::take(carry);
                while buffer.len() < *target && *extent_index < extents.len() {
                    let extent = extents[*extent_index];
                    let remaining = extent.length - *extent_pos;
                    if remaining == 0 {
                        *extent_index += 1;
                        *extent_pos = 0;
                        continue;
                    }
                    let want = remaining.min((*target - buffer.len()) as u64) as usize;
                    let start = buffer.len();
                    buffer.resize(start + want, 0);
                    let address = extent.address + *extent_pos;
                    if let Err(e) = read_at(*stream, address, &mut buffer[start..]) {
                        // Fatal: exhaust the stream
                        *extent_index = extents.len();
                        carry.clear();
                        return Some(Err(e));
                    }
                    *extent_pos += want as u64;
                }
                if buffer.is_empty() {
                    return None;
                }
                let whole = buffer.len() / *record_size * *record_size;
                // A partial tail at end-of-extents flushes as-is
                if whole > 0 && whole < buffer.len() {
                    *carry = buffer.split_off(whole);
                }
                let fragment = Fragment {
                    offset: *offset,
                    bytes: Cow::Owned(buffer),
                };
                *offset += fragment.bytes.len() as u64;
                log::debug!(
                    "sorted fragment: {} bytes at offset {}",
                    fragment.bytes.len(),
                    fragment.offset
                );
                Some(Ok(fragment))
            }
            State::Unsorted {
                stream,
                extents,
                extent_index,
                offset,
                record_id,
                record_id_len,
                record_sizes,
            } => {
                while *extent_index < extents.len() {
                    let extent = extents[*extent_index];
                    *extent_index += 1;
                    let mut buffer = vec![0u8; extent.length as usize];
                    if let Err(e) = read_at(*stream, extent.address, &mut buffer) {
                        *extent_index = extents.len();
                        return Some(Err(e));
                    }
                    let records = demux_records(&buffer, *record_id, *record_id_len, record_sizes);
                    if records.is_empty() {
                        continue;
                    }
                    let fragment = Fragment {
                        offset: *offset,
                        bytes: Cow::Owned(records),
                    };
                    *offset += fragment.bytes.len() as u64;
                    return Some(Ok(fragment));
                }
                None
            }
        }
    }
}

fn read_at(stream: &mut dyn ReadSeek, address: u64, buffer: &mut [u8]) -> Result<()> {
    stream.seek(SeekFrom::Start(address)).map_err(Error::from)?;
    stream.read_exact(buffer).map_err(Error::from)
}

/// Pull the bare records matching `record_id` out of an ID-prefixed buffer.
///
/// Records with an ID missing from `record_sizes` cannot be skipped over
/// (their size is unknown), so scanning stops there; slightly malformed
/// tails degrade to the records recovered so far.
fn demux_records(
    buffer: &[u8],
    record_id: u16,
    record_id_len: usize,
    record_sizes: &HashMap<u16, usize>,
) -> Vec<u8> {
    let mut records = Vec::new();
    let mut pos = 0usize;
    while pos < buffer.len() {
        let id = buffer[pos] as u16;
        pos += 1;
        let size = match record_sizes.get(&id) {
            Some(&size) => size,
            None => {
                log::warn!("unknown record id {id} at byte {}, stopping scan", pos - 1);
                break;
            }
        };
        if pos + size > buffer.len() {
            log::warn!("truncated record (id {id}) at end of extent");
            break;
        }
        if id == record_id {
            records.extend_from_slice(&buffer[pos..pos + size]);
        }
        pos += size;
        // Two-byte layouts repeat the ID after the record
        if record_id_len == 2 {
            pos += 1;
        }
    }
    records
}

//! File assembly: serialize the whole block graph to one coherent byte
//! stream with every cross-reference resolved.
//!
//! Addresses are assigned monotonically as blocks are appended to the
//! [`BlockSink`]; references to blocks that do not exist yet (the header's
//! first-group link, channel chains, dependency targets in later groups)
//! are patched once the target address is known. Identical text blocks and
//! identical conversion trees are written once and shared.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::blocks::{
    ChannelBlock, ConversionBlock, DependencyBlock, HeaderBlock, IdentificationBlock,
    ProgramBlock, TextBlock,
};
use crate::fragment::DataLocation;
use crate::mdf::Mdf;
use crate::parsing::RawDataGroup;
use crate::{Error, Result};

impl Mdf {
    /// Serialize the file to a byte buffer.
    ///
    /// Memory-resident files serialize from their in-memory blocks; files
    /// with groups still backed by the source or scratch file re-stream
    /// those raw bytes without materializing the whole group.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let all_memory = self
            .data_groups
            .iter()
            .all(|group| group.location == DataLocation::Memory);
        let Mdf {
            identification,
            header,
            comment,
            program,
            data_groups,
            source,
            scratch,
            ..
        } = self;
        if all_memory {
            assemble(
                identification,
                header,
                comment.as_deref(),
                program.as_ref(),
                data_groups,
                &mut WithMetadata,
            )
        } else {
            assemble(
                identification,
                header,
                comment.as_deref(),
                program.as_ref(),
                data_groups,
                &mut WithoutMetadata { source, scratch },
            )
        }
    }

    /// Write the file to `path`.
    ///
    /// When `path` is the file this instance was opened from, the bytes go
    /// to a temporary file first and replace the original atomically; the
    /// instance is then re-opened from the result so addresses and caches
    /// match the bytes on disk.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        log::debug!("saving {} bytes to {}", bytes.len(), path.display());
        if self.is_live_source(path) {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let mut temp = match dir {
                Some(dir) => NamedTempFile::new_in(dir)?,
                None => NamedTempFile::new()?,
            };
            temp.write_all(&bytes)?;
            temp.persist(path).map_err(|e| Error::IOError(e.error))?;
            *self = Mdf::open(path)?;
        } else {
            let mut file = File::create(path)?;
            file.write_all(&bytes)?;
        }
        Ok(())
    }

    fn is_live_source(&self, path: &Path) -> bool {
        match &self.source_path {
            Some(source) => {
                source == path
                    || matches!(
                        (source.canonicalize(), path.canonicalize()),
                        (Ok(a), Ok(b)) if a == b
                    )
            }
            None => false,
        }
    }
}

/// How a data group's raw record bytes are obtained while saving.
trait PersistStrategy {
    /// The group's raw bytes in stored (possibly multiplexed) form.
    fn group_data(&mut self, group: &RawDataGroup) -> Result<Vec<u8>>;

    /// Whether channel chains are written back to front, so each block can
    /// embed its successor's already-known address, instead of front to
    /// back with a patch pass.
    fn reverse_channel_chain(&self) -> bool;
}

/// Everything resident: data copies straight out of memory.
struct WithMetadata;

impl PersistStrategy for WithMetadata {
    fn group_data(&mut self, group: &RawDataGroup) -> Result<Vec<u8>> {
        Ok(group.data.clone())
    }

    fn reverse_channel_chain(&self) -> bool {
        false
    }
}

/// Some groups still live in the source or scratch file; their extents are
/// re-streamed as-is.
struct WithoutMetadata<'a> {
    source: &'a mut Option<File>,
    scratch: &'a mut Option<NamedTempFile>,
}

impl PersistStrategy for WithoutMetadata<'_> {
    fn group_data(&mut self, group: &RawDataGroup) -> Result<Vec<u8>> {
        let stream: &mut dyn crate::fragment::ReadSeek = match group.location {
            DataLocation::Memory => return Ok(group.data.clone()),
            DataLocation::SourceFile => self.source.as_mut().ok_or_else(|| {
                Error::UnsupportedOperation(String::from("data group has no backing file"))
            })?,
            DataLocation::ScratchFile => {
                self.scratch.as_mut().map(|t| t.as_file_mut()).ok_or_else(|| {
                    Error::UnsupportedOperation(String::from("data group has no scratch file"))
                })?
            }
        };
        let mut data = Vec::new();
        for extent in &group.extents {
            let start = data.len();
            data.resize(start + extent.length as usize, 0);
            stream.seek(SeekFrom::Start(extent.address))?;
            stream.read_exact(&mut data[start..])?;
        }
        Ok(data)
    }

    fn reverse_channel_chain(&self) -> bool {
        true
    }
}

/// Growing output buffer with monotonic address assignment and
/// content-addressed text/conversion deduplication.
struct BlockSink {
    buffer: Vec<u8>,
    defined_texts: HashMap<String, u32>,
    defined_conversions: HashMap<Vec<u8>, u32>,
}

impl BlockSink {
    fn new() -> Self {
        BlockSink {
            buffer: Vec::new(),
            defined_texts: HashMap::new(),
            defined_conversions: HashMap::new(),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<u32> {
        let addr = self.buffer.len();
        if addr + bytes.len() > u32::MAX as usize {
            return Err(Error::BlockSerializationError(String::from(
                "file exceeds the format's 32-bit address space",
            )));
        }
        self.buffer.extend_from_slice(bytes);
        Ok(addr as u32)
    }

    /// Address of a TX block with this text, writing it on first use.
    fn text(&mut self, text: &str) -> Result<u32> {
        if let Some(&addr) = self.defined_texts.get(text) {
            return Ok(addr);
        }
        let addr = self.push(&TextBlock::new(text).to_bytes())?;
        self.defined_texts.insert(text.to_string(), addr);
        Ok(addr)
    }

    /// Address of a CC block, sharing earlier identical conversions.
    fn conversion(&mut self, conversion: &ConversionBlock) -> Result<u32> {
        // Range-to-text targets carry addresses from the previous file;
        // rewrite them against this sink before serializing.
        let mut block = conversion.clone();
        for range in &mut block.range_texts {
            if let Some(text) = range.text.clone() {
                range.text_addr = self.text(&text)?;
            }
        }
        let bytes = block.to_bytes()?;
        if let Some(&addr) = self.defined_conversions.get(&bytes) {
            return Ok(addr);
        }
        let addr = self.push(&bytes)?;
        self.defined_conversions.insert(bytes, addr);
        Ok(addr)
    }

    fn patch_u32(&mut self, block_addr: u32, field_offset: usize, value: u32) {
        let at = block_addr as usize + field_offset;
        self.buffer[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }
}

/// A dependency-block reference slot awaiting its target's address.
struct DepFixup {
    cd_addr: u32,
    slot: usize,
    target: (usize, usize),
}

fn assemble(
    identification: &IdentificationBlock,
    header: &HeaderBlock,
    comment: Option<&str>,
    program: Option<&ProgramBlock>,
    data_groups: &[RawDataGroup],
    strategy: &mut dyn PersistStrategy,
) -> Result<Vec<u8>> {
    let mut sink = BlockSink::new();
    sink.push(&identification.to_bytes())?;

    let mut hd = header.clone();
    hd.first_dg_addr = 0;
    hd.comment_addr = 0;
    hd.program_addr = 0;
    hd.dg_count = data_groups.len() as u16;
    let hd_addr = sink.push(&hd.to_bytes())?;

    if let Some(text) = comment {
        let addr = sink.text(text)?;
        sink.patch_u32(hd_addr, 8, addr);
    }
    if let Some(program) = program {
        let addr = sink.push(&program.to_bytes())?;
        sink.patch_u32(hd_addr, 12, addr);
    }

    // Addresses collected while groups are laid out, for the final
    // dependency patch pass.
    let mut cn_addrs: HashMap<(usize, usize), u32> = HashMap::new();
    let mut cg_addr_of_flat: Vec<u32> = Vec::new();
    let mut dg_addr_of_flat: Vec<u32> = Vec::new();
    let mut dep_fixups: Vec<DepFixup> = Vec::new();

    let mut first_dg_addr = 0u32;
    let mut prev_dg_addr: Option<u32> = None;
    let mut flat = 0usize;

    for group in data_groups {
        let data = strategy.group_data(group)?;
        let data_addr = if data.is_empty() { 0 } else { sink.push(&data)? };

        let mut first_cg_addr = 0u32;
        let mut prev_cg_addr: Option<u32> = None;
        let group_flat_base = flat;

        for cg in &group.channel_groups {
            // Per-channel side blocks first, so the channel chain can
            // embed their addresses.
            let mut prepared: Vec<ChannelBlock> = Vec::with_capacity(cg.channels.len());
            for (index, channel) in cg.channels.iter().enumerate() {
                let mut cn = channel.clone();
                cn.next_ch_addr = 0;
                cn.source_addr = 0;
                cn.comment_addr = 0;
                cn.display_name_addr = 0;
                cn.conversion_addr = match &channel.conversion {
                    Some(conversion) => sink.conversion(conversion)?,
                    None => 0,
                };
                // Names beyond the 31-char inline field go to a TX block
                cn.long_name_addr = if channel.display_name().len() > 31 {
                    sink.text(channel.display_name())?
                } else {
                    0
                };
                cn.dependency_addr = match &cg.dependencies[index] {
                    Some(dep) => {
                        let element_count: usize = dep.dims.iter().product();
                        let block = if dep.dims.len() > 1 && element_count == dep.refs.len() {
                            DependencyBlock::new_ndim(
                                dep.dims.iter().map(|&d| d as u16).collect(),
                            )
                        } else {
                            DependencyBlock::new_vector(dep.refs.len())
                        };
                        let addr = sink.push(&block.to_bytes())?;
                        for (slot, &target) in dep.refs.iter().enumerate() {
                            dep_fixups.push(DepFixup {
                                cd_addr: addr,
                                slot,
                                target,
                            });
                        }
                        addr
                    }
                    None => 0,
                };
                prepared.push(cn);
            }

            let mut addrs = vec![0u32; prepared.len()];
            if strategy.reverse_channel_chain() {
                let mut next = 0u32;
                for (index, cn) in prepared.iter_mut().enumerate().rev() {
                    cn.next_ch_addr = next;
                    let addr = sink.push(&cn.to_bytes())?;
                    addrs[index] = addr;
                    next = addr;
                }
            } else {
                for (index, cn) in prepared.iter().enumerate() {
                    addrs[index] = sink.push(&cn.to_bytes())?;
                }
                for index in 0..addrs.len().saturating_sub(1) {
                    sink.patch_u32(addrs[index], 4, addrs[index + 1]);
                }
            }
            for (index, &addr) in addrs.iter().enumerate() {
                cn_addrs.insert((flat, index), addr);
            }

            let mut cg_block = cg.block.clone();
            cg_block.next_cg_addr = 0;
            cg_block.first_ch_addr = addrs.first().copied().unwrap_or(0);
            cg_block.comment_addr = 0;
            cg_block.first_sample_reduction_addr = 0;
            cg_block.channel_count = cg.channels.len() as u16;
            let cg_addr = sink.push(&cg_block.to_bytes())?;
            if let Some(prev) = prev_cg_addr {
                sink.patch_u32(prev, 4, cg_addr);
            }
            prev_cg_addr = Some(cg_addr);
            if first_cg_addr == 0 {
                first_cg_addr = cg_addr;
            }
            cg_addr_of_flat.push(cg_addr);
            flat += 1;
        }

        let trigger_addr = match &group.trigger {
            Some(trigger) => {
                let mut tr = trigger.clone();
                tr.comment_addr = 0;
                sink.push(&tr.to_bytes())?
            }
            None => 0,
        };

        let mut dg_block = group.block.clone();
        dg_block.next_dg_addr = 0;
        dg_block.first_cg_addr = first_cg_addr;
        dg_block.trigger_addr = trigger_addr;
        dg_block.data_addr = data_addr;
        dg_block.cg_count = group.channel_groups.len() as u16;
        let dg_addr = sink.push(&dg_block.to_bytes())?;
        if let Some(prev) = prev_dg_addr {
            sink.patch_u32(prev, 4, dg_addr);
        }
        prev_dg_addr = Some(dg_addr);
        if first_dg_addr == 0 {
            first_dg_addr = dg_addr;
        }
        for _ in group_flat_base..flat {
            dg_addr_of_flat.push(dg_addr);
        }
    }

    // Final pass: every block address is known, resolve the deferred
    // dependency references.
    for fixup in dep_fixups {
        let (group, channel) = fixup.target;
        match (
            dg_addr_of_flat.get(group),
            cg_addr_of_flat.get(group),
            cn_addrs.get(&(group, channel)),
        ) {
            (Some(&dg), Some(&cg), Some(&cn)) => {
                let base = 8 + 12 * fixup.slot;
                sink.patch_u32(fixup.cd_addr, base, dg);
                sink.patch_u32(fixup.cd_addr, base + 4, cg);
                sink.patch_u32(fixup.cd_addr, base + 8, cn);
            }
            _ => log::warn!(
                "dependency reference to missing channel ({group}, {channel}) left null"
            ),
        }
    }

    sink.patch_u32(hd_addr, 4, first_dg_addr);
    Ok(sink.buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::DecodeOptions;
    use crate::parsing::ArrayDependency;
    use crate::types::{Samples, Signal};

    fn sample_mdf() -> Mdf {
        let mut mdf = Mdf::new();
        let mut speed = Signal::new(
            "speed",
            Samples::Float(vec![0.0, 10.5, 21.0]),
            vec![0.0, 0.1, 0.2],
        );
        speed.unit = String::from("km/h");
        let gear = Signal::new(
            "gear",
            Samples::UnsignedInteger(vec![1, 2, 3]),
            vec![0.0, 0.1, 0.2],
        );
        mdf.append(&[speed, gear]).unwrap();
        mdf
    }

    #[test]
    fn empty_file_roundtrip() {
        let bytes = Mdf::new().to_bytes().unwrap();
        let reparsed = Mdf::from_bytes(&bytes).unwrap();
        assert_eq!(reparsed.group_count(), 0);
        assert_eq!(reparsed.header.first_dg_addr, 0);
    }

    #[test]
    fn serialized_file_decodes_to_the_same_samples() {
        let mut mdf = sample_mdf();
        let original = mdf.get("speed", &DecodeOptions::default()).unwrap();
        let bytes = mdf.to_bytes().unwrap();
        let mut reparsed = Mdf::from_bytes(&bytes).unwrap();
        let decoded = reparsed.get("speed", &DecodeOptions::default()).unwrap();
        assert_eq!(decoded.samples, original.samples);
        assert_eq!(decoded.timestamps, original.timestamps);
        assert_eq!(decoded.unit, "km/h");
    }

    #[test]
    fn saving_is_idempotent() {
        let mut mdf = sample_mdf();
        let first = mdf.to_bytes().unwrap();
        let mut reparsed = Mdf::from_bytes(&first).unwrap();
        let second = reparsed.to_bytes().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn texts_and_conversions_are_deduplicated() {
        let mut sink = BlockSink::new();
        let a = sink.text("shared comment").unwrap();
        let b = sink.text("shared comment").unwrap();
        assert_eq!(a, b);
        let c = sink.conversion(&ConversionBlock::identity("V")).unwrap();
        let d = sink.conversion(&ConversionBlock::identity("V")).unwrap();
        assert_eq!(c, d);
        let e = sink.conversion(&ConversionBlock::identity("A")).unwrap();
        assert_ne!(c, e);
    }

    #[test]
    fn long_channel_names_survive_via_text_blocks() {
        let mut mdf = Mdf::new();
        let long = "a_channel_name_well_beyond_the_thirty_one_character_field";
        mdf.append(&[Signal::new(long, Samples::Float(vec![1.0]), vec![0.0])])
            .unwrap();
        let bytes = mdf.to_bytes().unwrap();
        let reparsed = Mdf::from_bytes(&bytes).unwrap();
        assert!(reparsed.contains_channel(long));
    }

    #[test]
    fn dependency_references_roundtrip() {
        let mut mdf = Mdf::new();
        mdf.append(&[
            Signal::new("row0", Samples::Float(vec![1.0]), vec![0.0]),
            Signal::new("row1", Samples::Float(vec![2.0]), vec![0.0]),
        ])
        .unwrap();
        mdf.data_groups[0].channel_groups[0].dependencies[1] = Some(ArrayDependency {
            refs: vec![(0, 1), (0, 2)],
            dims: vec![2],
        });
        let bytes = mdf.to_bytes().unwrap();
        let reparsed = Mdf::from_bytes(&bytes).unwrap();
        let cg = reparsed.channel_group(0).unwrap();
        assert_eq!(
            cg.dependencies[1],
            Some(ArrayDependency {
                refs: vec![(0, 1), (0, 2)],
                dims: vec![2],
            })
        );
    }

    #[test]
    fn comment_and_trigger_are_preserved() {
        let mut mdf = sample_mdf();
        mdf.comment = Some(String::from("bench run 42"));
        mdf.data_groups[0].trigger = Some(crate::blocks::TriggerBlock::new(vec![
            crate::blocks::TriggerEvent {
                time: 1.0,
                pre_time: 0.5,
                post_time: 0.0,
            },
        ]));
        let bytes = mdf.to_bytes().unwrap();
        let reparsed = Mdf::from_bytes(&bytes).unwrap();
        assert_eq!(reparsed.comment.as_deref(), Some("bench run 42"));
        let events = &reparsed.data_groups[0].trigger.as_ref().unwrap().events;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 1.0);
    }
}

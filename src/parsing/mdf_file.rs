use std::collections::HashMap;

use super::{ArrayDependency, RawChannelGroup, RawDataGroup};
use crate::blocks::{
    BlockParse, ChannelBlock, ChannelGroupBlock, DataGroupBlock, DependencyBlock, HeaderBlock,
    IdentificationBlock, ID_BLOCK_SIZE, ProgramBlock, TextBlock, TriggerBlock,
};
use crate::blocks::common::addr_to_usize;
use crate::fragment::{DataExtent, DataLocation};
use crate::{Error, Result};

/// A parsed MDF3 block graph: identification and header blocks plus every
/// data group with its channel groups and channels, dependencies resolved
/// to (group, channel) indices.
#[derive(Debug, Clone)]
pub struct MdfFile {
    pub identification: IdentificationBlock,
    pub header: HeaderBlock,
    pub comment: Option<String>,
    pub program: Option<ProgramBlock>,
    pub data_groups: Vec<RawDataGroup>,
}

impl MdfFile {
    /// Parse a complete file image.
    ///
    /// `location` decides where group data ends up: `Memory` copies each
    /// group's raw record bytes out of `data`, anything else records the
    /// physical extents so decoding can stream from the backing file
    /// later. The `data` buffer itself is not retained.
    pub fn parse(data: &[u8], location: DataLocation) -> Result<Self> {
        if data.len() < ID_BLOCK_SIZE + 4 {
            return Err(Error::TooShortBuffer {
                actual: data.len(),
                expected: ID_BLOCK_SIZE + 4,
                file: file!(),
                line: line!(),
            });
        }

        let identification = IdentificationBlock::from_bytes(&data[..ID_BLOCK_SIZE])?;
        let header = HeaderBlock::from_bytes(&data[ID_BLOCK_SIZE..])?;
        let comment = read_text(data, header.comment_addr)?;
        let program = match checked_slice(data, header.program_addr)? {
            Some(bytes) => Some(ProgramBlock::from_bytes(bytes)?),
            None => None,
        };

        // First pass: walk the DG -> CG -> CN linked lists. Dependencies
        // can point at channels in groups parsed later, so only their
        // addresses are collected here.
        let mut data_groups = Vec::new();
        let mut channel_addresses: HashMap<u32, (usize, usize)> = HashMap::new();
        // (data group, channel group, channel, CD address)
        let mut pending_deps: Vec<(usize, usize, usize, u32)> = Vec::new();
        let mut flat_index = 0usize;

        let mut dg_addr = header.first_dg_addr;
        while dg_addr != 0 {
            let bytes = require_slice(data, dg_addr)?;
            let dg_block = DataGroupBlock::from_bytes(bytes)?;
            let next_dg_addr = dg_block.next_dg_addr;

            let mut channel_groups = Vec::new();
            let mut cg_addr = dg_block.first_cg_addr;
            while cg_addr != 0 {
                let cg_block = ChannelGroupBlock::from_bytes(require_slice(data, cg_addr)?)?;
                let next_cg_addr = cg_block.next_cg_addr;

                let mut channels = Vec::new();
                let mut cn_addr = cg_block.first_ch_addr;
                while cn_addr != 0 {
                    let mut channel = ChannelBlock::from_bytes(require_slice(data, cn_addr)?)?;
                    channel.resolve_name(data)?;
                    channel.resolve_conversion(data)?;
                    channel_addresses.insert(cn_addr, (flat_index, channels.len()));
                    if channel.dependency_addr != 0 {
                        pending_deps.push((
                            data_groups.len(),
                            channel_groups.len(),
                            channels.len(),
                            channel.dependency_addr,
                        ));
                    }
                    cn_addr = channel.next_ch_addr;
                    channels.push(channel);
                }

                let dep_slots = vec![None; channels.len()];
                channel_groups.push(RawChannelGroup::new(cg_block, channels, dep_slots));
                flat_index += 1;
                cg_addr = next_cg_addr;
            }

            let trigger = match checked_slice(data, dg_block.trigger_addr)? {
                Some(bytes) => Some(TriggerBlock::from_bytes(bytes)?),
                None => None,
            };

            let mut group = RawDataGroup {
                block: dg_block,
                channel_groups,
                trigger,
                location,
                data: Vec::new(),
                extents: Vec::new(),
            };

            let stored = group.stored_size();
            if group.block.data_addr != 0 && stored > 0 {
                let start = addr_to_usize(group.block.data_addr);
                match location {
                    DataLocation::Memory => {
                        let end = start
                            .checked_add(stored as usize)
                            .filter(|&end| end <= data.len())
                            .ok_or(Error::TooShortBuffer {
                                actual: data.len(),
                                expected: start + stored as usize,
                                file: file!(),
                                line: line!(),
                            })?;
                        group.data = data[start..end].to_vec();
                    }
                    DataLocation::SourceFile | DataLocation::ScratchFile => {
                        group.extents = vec![DataExtent {
                            address: group.block.data_addr as u64,
                            length: stored,
                        }];
                    }
                }
            }

            data_groups.push(group);
            dg_addr = next_dg_addr;
        }

        // Second pass: resolve dependency references now that every
        // channel's flat index is known.
        for (dg, cg, cn, cd_addr) in pending_deps {
            let block = DependencyBlock::from_bytes(require_slice(data, cd_addr)?)?;
            let mut refs = Vec::with_capacity(block.refs.len());
            let mut complete = true;
            for &(_, _, ref_cn_addr) in &block.refs {
                match channel_addresses.get(&ref_cn_addr) {
                    Some(&target) => refs.push(target),
                    None => {
                        log::warn!(
                            "dependency reference to unknown channel address {ref_cn_addr}"
                        );
                        complete = false;
                        break;
                    }
                }
            }
            if complete {
                let dims = block.dimensions();
                data_groups[dg].channel_groups[cg].dependencies[cn] =
                    Some(ArrayDependency { refs, dims });
            }
        }

        Ok(Self {
            identification,
            header,
            comment,
            program,
            data_groups,
        })
    }
}

fn require_slice(data: &[u8], addr: u32) -> Result<&[u8]> {
    let offset = addr_to_usize(addr);
    if offset + 4 > data.len() {
        return Err(Error::TooShortBuffer {
            actual: data.len(),
            expected: offset + 4,
            file: file!(),
            line: line!(),
        });
    }
    Ok(&data[offset..])
}

fn checked_slice(data: &[u8], addr: u32) -> Result<Option<&[u8]>> {
    if addr == 0 {
        return Ok(None);
    }
    require_slice(data, addr).map(Some)
}

fn read_text(data: &[u8], addr: u32) -> Result<Option<String>> {
    match checked_slice(data, addr)? {
        Some(bytes) => Ok(Some(TextBlock::from_bytes(bytes)?.text)),
        None => Ok(None),
    }
}

use std::collections::HashMap;

use super::RawChannelGroup;
use crate::blocks::{DataGroupBlock, TriggerBlock};
use crate::fragment::{DataExtent, DataLocation};

/// One data group: channel groups sharing a physical raw-data region.
#[derive(Debug, Clone)]
pub struct RawDataGroup {
    pub block: DataGroupBlock,
    pub channel_groups: Vec<RawChannelGroup>,
    pub trigger: Option<TriggerBlock>,
    pub location: DataLocation,
    /// Raw record bytes when `location` is `Memory`, empty otherwise. For
    /// unsorted groups these still carry their record-ID prefixes.
    pub data: Vec<u8>,
    /// Physical spans in the backing file when not memory-resident.
    pub extents: Vec<DataExtent>,
}

impl RawDataGroup {
    /// Single record type, no record-ID prefixes.
    pub fn is_sorted(&self) -> bool {
        self.block.record_id_len == 0
    }

    /// Record ID to bare record size, for demultiplexing unsorted groups.
    pub fn record_sizes(&self) -> HashMap<u16, usize> {
        self.channel_groups
            .iter()
            .map(|cg| (cg.block.record_id, cg.record_size()))
            .collect()
    }

    /// Total stored byte size including any record-ID overhead.
    pub fn stored_size(&self) -> u64 {
        let id_overhead = self.block.record_id_len as u64;
        self.channel_groups
            .iter()
            .map(|cg| cg.block.cycle_count as u64 * (cg.record_size() as u64 + id_overhead))
            .sum()
    }
}

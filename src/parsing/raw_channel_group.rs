use std::cell::RefCell;
use std::rc::Rc;

use crate::blocks::{ChannelBlock, ChannelGroupBlock};
use crate::layout::{RecordLayout, build_record_layout};

/// A resolved channel dependency: the channel is an array or structure
/// assembled from other channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDependency {
    /// Referenced channels as (flattened group index, channel index).
    pub refs: Vec<(usize, usize)>,
    /// Dimension sizes; one entry for plain vectors.
    pub dims: Vec<usize>,
}

impl ArrayDependency {
    pub fn element_count(&self) -> usize {
        self.dims.iter().product()
    }
}

/// One channel group with its parsed channels and the lazily built record
/// layout.
#[derive(Debug, Clone)]
pub struct RawChannelGroup {
    pub block: ChannelGroupBlock,
    pub channels: Vec<ChannelBlock>,
    /// Parallel to `channels`; `Some` for array/structure channels.
    pub dependencies: Vec<Option<ArrayDependency>>,
    // Cached layout, rebuilt on demand after invalidation
    layout: RefCell<Option<Rc<RecordLayout>>>,
}

impl RawChannelGroup {
    pub fn new(
        block: ChannelGroupBlock,
        channels: Vec<ChannelBlock>,
        dependencies: Vec<Option<ArrayDependency>>,
    ) -> Self {
        RawChannelGroup {
            block,
            channels,
            dependencies,
            layout: RefCell::new(None),
        }
    }

    /// The group's record layout, building it on first use.
    pub fn layout(&self) -> Rc<RecordLayout> {
        let mut cached = self.layout.borrow_mut();
        match &*cached {
            Some(layout) => Rc::clone(layout),
            None => {
                let layout = Rc::new(build_record_layout(
                    &self.channels,
                    self.block.record_size as usize,
                ));
                *cached = Some(Rc::clone(&layout));
                layout
            }
        }
    }

    /// Drop the cached layout. Must be called after any channel-list
    /// mutation.
    pub fn invalidate_layout(&self) {
        *self.layout.borrow_mut() = None;
    }

    /// Index of the master (time) channel, if the group has one.
    pub fn master_index(&self) -> Option<usize> {
        self.channels.iter().position(|c| c.is_master())
    }

    /// Find a channel by resolved name.
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.display_name() == name)
    }

    pub fn cycle_count(&self) -> usize {
        self.block.cycle_count as usize
    }

    pub fn record_size(&self) -> usize {
        self.block.record_size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::channel_block::CHANNEL_TYPE_MASTER;

    fn group_with_channels() -> RawChannelGroup {
        let mut time = ChannelBlock::default();
        time.short_name = String::from("time");
        time.channel_type = CHANNEL_TYPE_MASTER;
        time.bit_count = 64;
        time.data_type = crate::blocks::DataType::DoubleLE;

        let mut value = ChannelBlock::default();
        value.short_name = String::from("value");
        value.start_offset = 64;
        value.bit_count = 16;

        let mut block = ChannelGroupBlock::default();
        block.record_size = 10;
        block.channel_count = 2;
        RawChannelGroup::new(block, vec![time, value], vec![None, None])
    }

    #[test]
    fn layout_is_cached_until_invalidated() {
        let group = group_with_channels();
        let first = group.layout();
        let second = group.layout();
        assert!(Rc::ptr_eq(&first, &second));
        group.invalidate_layout();
        let third = group.layout();
        assert!(!Rc::ptr_eq(&first, &third));
        assert_eq!(*first, *third);
    }

    #[test]
    fn master_lookup() {
        let group = group_with_channels();
        assert_eq!(group.master_index(), Some(0));
        assert_eq!(group.channel_index("value"), Some(1));
        assert_eq!(group.channel_index("missing"), None);
    }
}

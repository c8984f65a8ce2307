//! Parsing of the block graph into raw group/channel structures.

mod mdf_file;
mod raw_channel_group;
mod raw_data_group;

pub use mdf_file::MdfFile;
pub use raw_channel_group::{ArrayDependency, RawChannelGroup};
pub use raw_data_group::RawDataGroup;

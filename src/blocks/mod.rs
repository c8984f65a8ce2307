//! MDF3 block primitives.
//!
//! Every linked block in an MDF3 file starts with a 4-byte header (2-byte
//! ASCII identifier plus 16-bit total size) and is addressed by a 32-bit
//! absolute file offset. This module holds one file per block kind along
//! with the shared parsing helpers in [`common`].

pub mod channel_block;
pub mod channel_group_block;
pub mod common;
pub mod conversion;
pub mod data_group_block;
pub mod dependency_block;
pub mod header_block;
pub mod identification_block;
pub mod program_block;
pub mod text_block;
pub mod trigger_block;

pub use channel_block::{CHANNEL_TYPE_DATA, CHANNEL_TYPE_MASTER, CN_BLOCK_SIZE, ChannelBlock};
pub use channel_group_block::{CG_BLOCK_SIZE, ChannelGroupBlock};
pub use common::{BlockHeader, BlockParse, DataType};
pub use conversion::{ConversionBlock, ConversionType, RangeText};
pub use data_group_block::{DG_BLOCK_SIZE, DataGroupBlock};
pub use dependency_block::{DEPENDENCY_TYPE_NDIM, DEPENDENCY_TYPE_VECTOR, DependencyBlock};
pub use header_block::{HD_BLOCK_SIZE, HeaderBlock};
pub use identification_block::{ID_BLOCK_SIZE, IdentificationBlock};
pub use program_block::ProgramBlock;
pub use text_block::TextBlock;
pub use trigger_block::{TriggerBlock, TriggerEvent};

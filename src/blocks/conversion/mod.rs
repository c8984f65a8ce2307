mod base;
mod formula;
mod linear;
mod table_lookup;
mod text;
mod types;

pub use base::{CC_BLOCK_SIZE_MIN, ConversionBlock, RangeText};
pub use types::ConversionType;

#![forbid(unsafe_code)]

//! # mdf3-rs
//!
//! A Rust library for reading and writing ASAM MDF 3 (Measurement Data Format) files.
//!
//! MDF3 is a binary file format standardized by ASAM for storing measurement data,
//! widely used in automotive applications for recording sensor data and other
//! time-series measurements. Files are block structured: a fixed identification
//! block, a header block, and linked lists of data groups, channel groups and
//! channels describing fixed-size sample records.
//!
//! ## Features
//!
//! - **Reading**: Parse MDF3 files and decode channel data with automatic value
//!   conversion (linear, tabular, formula, text tables)
//! - **Writing**: Create new files from signals, extend existing groups and save
//!   with all cross-references resolved
//! - **Streaming**: Raw records stay in the file and are decoded in bounded
//!   fragments, so large files never have to fit in memory
//! - **Indexing**: Generate lightweight JSON indexes for efficient partial reads
//!
//! ## Supported MDF Version
//!
//! This crate targets MDF 3.0 through 3.3 and implements the subset of the
//! specification sufficient for common measurement workflows:
//!
//! - Standard data types (integers of 1..64 bits, floats, strings, byte arrays)
//!   in both byte orders, including bit-packed channels
//! - Sorted and unsorted (record-ID multiplexed) data groups
//! - The MDF3 conversion catalogue: linear, tabular, polynomial, exponential,
//!   logarithmic, rational, text formula, value-to-text and range-to-text
//! - Array and structure channels via channel dependencies
//!
//! ## Quick Start
//!
//! ### Reading a file
//!
//! ```no_run
//! use mdf3_rs::{Mdf, DecodeOptions, Result};
//!
//! fn main() -> Result<()> {
//!     let mut mdf = Mdf::open("recording.dat")?;
//!
//!     for name in mdf.channel_names() {
//!         let signal = mdf.get(&name, &DecodeOptions::default())?;
//!         println!("{}: {} samples [{}]", signal.name, signal.samples.len(), signal.unit);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Writing a file
//!
//! ```no_run
//! use mdf3_rs::{Mdf, Samples, Signal, Result};
//!
//! fn main() -> Result<()> {
//!     let mut mdf = Mdf::new();
//!     let mut speed = Signal::new(
//!         "speed",
//!         Samples::Float(vec![0.0, 12.5, 25.0]),
//!         vec![0.0, 0.1, 0.2],
//!     );
//!     speed.unit = String::from("km/h");
//!     mdf.append(&[speed])?;
//!     mdf.save("output.dat")?;
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. The [`Error`] enum covers I/O errors,
//! parsing failures and invalid selections.

pub mod blocks;
pub mod parsing;

mod bitfield;
mod decode;
mod mdf;
mod persist;
mod types;

pub mod error;
pub mod fragment;
#[cfg(feature = "serde")]
pub mod index;
pub mod layout;

// Re-export commonly used types at the crate root
pub use bitfield::extract_bit_field;
pub use blocks::{ConversionBlock, ConversionType, DataType};
pub use decode::DecodeOptions;
pub use error::{Error, Result};
pub use fragment::{DataExtent, DataLocation, Fragment, FragmentStream, StreamConfig};
#[cfg(feature = "serde")]
pub use index::{ByteRangeReader, FileRangeReader, MdfIndex};
pub use layout::{LayoutField, Parent, RecordLayout, build_record_layout};
pub use mdf::Mdf;
pub use types::{Samples, Signal, Value};

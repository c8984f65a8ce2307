//! Error types for MDF3 operations.
//!
//! This module defines the [`Error`] enum which represents all possible failures
//! that can occur when reading, writing, or processing MDF version 3 files.
//!
//! Recoverable structural irregularities in an input file (for example a
//! channel whose declared bit range does not fit its record) are absorbed
//! internally by the decoding engine and never surface here; the variants
//! below are reserved for unresolvable requests and unrecoverable I/O.

use core::fmt;

/// Errors that can occur during MDF file operations.
#[derive(Debug)]
pub enum Error {
    /// Buffer provided for parsing was too small.
    ///
    /// This typically indicates file corruption or an incomplete read.
    TooShortBuffer {
        /// Actual number of bytes available
        actual: usize,
        /// Minimum number of bytes required
        expected: usize,
        /// Source file where the error was detected
        file: &'static str,
        /// Line number where the error was detected
        line: u32,
    },

    /// The file identifier is not "MDF     " as required by the specification.
    FileIdentifierError(String),

    /// The MDF version is not a 3.x version this crate can handle.
    UnsupportedVersion(String),

    /// A block identifier did not match the expected value.
    ///
    /// Each MDF3 block starts with a 2-character identifier (e.g., "HD" for
    /// the header block). This error indicates structural corruption.
    BlockIDError {
        /// The identifier that was found
        actual: String,
        /// The identifier that was expected
        expected: String,
    },

    /// An I/O error occurred while reading or writing the file.
    IOError(std::io::Error),

    /// No channel with the requested name exists in the file.
    ChannelNotFound(String),

    /// A group index was outside the range of groups in the file.
    GroupIndexOutOfRange {
        /// The requested group index
        group: usize,
        /// Number of groups in the file
        count: usize,
    },

    /// A channel index was outside the range of channels in its group.
    ChannelIndexOutOfRange {
        /// The group that was addressed
        group: usize,
        /// The requested channel index
        index: usize,
        /// Number of channels in that group
        count: usize,
    },

    /// Failed to link blocks together during file writing.
    ///
    /// This typically indicates a programming error where blocks are
    /// referenced before being written.
    BlockLinkError(String),

    /// Failed to serialize a block to bytes.
    BlockSerializationError(String),

    /// The requested operation is not valid for this group's storage shape.
    UnsupportedOperation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TooShortBuffer {
                actual,
                expected,
                file,
                line,
            } => write!(
                f,
                "Buffer too small at {file}:{line}: need at least {expected} bytes, got {actual}"
            ),
            Error::FileIdentifierError(id) => {
                write!(
                    f,
                    r#"Invalid file identifier: Expected "MDF     ", found {id}"#
                )
            }
            Error::UnsupportedVersion(ver) => {
                write!(f, "Unsupported MDF version: expected 3.x, found {ver}")
            }
            Error::BlockIDError { actual, expected } => {
                write!(
                    f,
                    "Invalid block identifier: Expected {expected:?}, got {actual:?}"
                )
            }
            Error::IOError(e) => write!(f, "I/O error: {e}"),
            Error::ChannelNotFound(name) => {
                write!(f, "Channel {name:?} not found in file")
            }
            Error::GroupIndexOutOfRange { group, count } => {
                write!(
                    f,
                    "Group index {group} out of range (file has {count} groups)"
                )
            }
            Error::ChannelIndexOutOfRange {
                group,
                index,
                count,
            } => write!(
                f,
                "Channel index {index} out of range (group {group} has {count} channels)"
            ),
            Error::BlockLinkError(s) => write!(f, "Block linking error: {s}"),
            Error::BlockSerializationError(s) => write!(f, "Block serialization error: {s}"),
            Error::UnsupportedOperation(s) => write!(f, "Unsupported operation: {s}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IOError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IOError(err)
    }
}

/// A specialized Result type for MDF operations.
pub type Result<T> = core::result::Result<T, Error>;

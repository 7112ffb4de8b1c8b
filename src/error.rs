//! Error types for image parsing and assembly.

use std::io;

use thiserror::Error;

use crate::data_dir::DirectoryType;

/// Result type alias for peimage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classes of failure.
///
/// `Format` and `Bounds` failures are local: the parser recovers from them by
/// returning a partial image or skipping the offending element. Everything else
/// aborts the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bytes do not form a valid structure.
    Format,
    /// An address or offset points outside the data it refers to.
    Bounds,
    /// The input ended in the middle of a structure.
    EndOfData,
    /// The underlying reader or writer failed.
    Io,
    /// The in-memory image cannot be serialized as it stands.
    Inconsistent,
}

/// Errors that can occur while reading or assembling an image.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error from the underlying source or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The input ended before a structure was complete.
    #[error("unexpected end of data at offset {offset:#x}: {needed} more bytes required")]
    EndOfData { offset: u64, needed: u64 },

    /// A forward-only cursor was asked to move backwards.
    #[error("cannot jump backwards from {position:#x} to {target:#x}")]
    BackwardJump { position: u64, target: u64 },

    /// A relative offset fell outside the buffer it indexes.
    #[error("offset {offset:#x} out of bounds (size: {size:#x})")]
    OffsetOutOfBounds { offset: i64, size: usize },

    /// No section maps the given virtual address.
    #[error("virtual address {0:#x} is not mapped by any section")]
    UnmappedAddress(u32),

    /// Directory index outside 0..16.
    #[error("invalid data directory index {0}")]
    InvalidDirectoryIndex(usize),

    /// Structure contents are not valid for their type.
    #[error("malformed {structure}: {reason}")]
    Malformed {
        structure: &'static str,
        reason: String,
    },

    /// A scheduled section has no raw bytes attached.
    #[error("section {0} has raw data in the header but no bytes in the image")]
    MissingSectionData(usize),

    /// Section bytes disagree with the header's raw size.
    #[error("section {index} holds {actual} bytes but its header declares {declared}")]
    SectionSizeMismatch {
        index: usize,
        declared: u32,
        actual: usize,
    },

    /// A stored preamble does not fill the gap before its region.
    #[error("preamble of {actual} bytes does not fill the {expected}-byte gap at {offset:#x}")]
    PreambleMismatch {
        offset: u64,
        expected: u64,
        actual: usize,
    },

    /// A scheduled directory has no payload attached.
    #[error("{0} directory is scheduled but has no payload")]
    MissingDirectory(DirectoryType),

    /// The debug raw-data block is scheduled but absent.
    #[error("debug raw data is scheduled but absent")]
    MissingDebugData,

    /// An encoded directory does not fit its declared size.
    #[error("{directory} directory encodes to {encoded} bytes but declares {declared}")]
    DirectoryOverflow {
        directory: DirectoryType,
        encoded: usize,
        declared: u32,
    },
}

impl Error {
    /// Create a malformed-structure error.
    pub fn malformed(structure: &'static str, reason: impl Into<String>) -> Self {
        Error::Malformed {
            structure,
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io(_) => ErrorCategory::Io,
            Error::EndOfData { .. } => ErrorCategory::EndOfData,
            Error::Malformed { .. } | Error::InvalidDirectoryIndex(_) => ErrorCategory::Format,
            Error::BackwardJump { .. }
            | Error::OffsetOutOfBounds { .. }
            | Error::UnmappedAddress(_) => ErrorCategory::Bounds,
            Error::MissingSectionData(_)
            | Error::SectionSizeMismatch { .. }
            | Error::PreambleMismatch { .. }
            | Error::MissingDirectory(_)
            | Error::MissingDebugData
            | Error::DirectoryOverflow { .. } => ErrorCategory::Inconsistent,
        }
    }

    /// Whether a caller may skip the failing element and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Format | ErrorCategory::Bounds
        )
    }
}

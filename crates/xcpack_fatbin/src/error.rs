//! Error types for archive and universal binary codecs.
//!
//! Each variant identifies the offset or architecture involved so that a
//! corrupt input can be located without a hex editor.

use crate::arch::Architecture;
use thiserror::Error;

/// Errors arising from reading or writing static archives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// The input does not start with the `!<arch>` magic.
    #[error("not a static archive: missing !<arch> magic")]
    BadMagic,

    /// A member header or body extends past the end of the input.
    #[error("archive truncated at offset {offset}")]
    Truncated {
        /// Byte offset where more data was expected.
        offset: usize,
    },

    /// A member header is malformed.
    #[error("malformed member header at offset {offset}: {reason}")]
    BadHeader {
        /// Byte offset of the header.
        offset: usize,
        /// Description of the problem.
        reason: String,
    },

    /// A member name cannot be stored.
    #[error("invalid member name \"{name}\": {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A member is too large for the ten-digit size field.
    #[error("member \"{name}\" is too large for an archive ({size} bytes)")]
    MemberTooLarge {
        /// The member name.
        name: String,
        /// Its size in bytes.
        size: usize,
    },

    /// The archive has no members.
    #[error("refusing to write an archive with no members")]
    Empty,
}

/// Errors arising from fusing, thinning, or listing universal binaries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UniversalError {
    /// Fewer than two slices were supplied to fuse.
    #[error("a universal binary needs at least two architectures, got {count}")]
    TooFewSlices {
        /// Number of slices supplied.
        count: usize,
    },

    /// The same architecture was supplied twice.
    #[error("architecture {0} supplied more than once")]
    DuplicateArchitecture(Architecture),

    /// An input slice is itself a universal binary.
    #[error("{0} slice is already a universal binary")]
    AlreadyUniversal(Architecture),

    /// An input slice is empty.
    #[error("{0} slice is empty")]
    EmptySlice(Architecture),

    /// The input is not a universal binary.
    #[error("not a universal binary")]
    NotUniversal,

    /// The header or a slice extends past the end of the input.
    #[error("universal binary truncated: {reason}")]
    Truncated {
        /// Description of the missing data.
        reason: String,
    },

    /// The requested architecture is not present.
    #[error("universal binary has no {0} slice")]
    SliceNotFound(Architecture),

    /// The fused output would exceed the 32-bit offsets of the format.
    #[error("fused binary exceeds the 4 GiB limit of 32-bit fat headers")]
    TooLarge,

    /// An architecture name is not one of the supported set.
    #[error("unknown architecture \"{name}\"; expected x86_64 or arm64")]
    UnknownArchitecture {
        /// The rejected name.
        name: String,
    },
}

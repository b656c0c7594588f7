//! Byte-level codecs for universal artefact assembly.
//!
//! This crate has no I/O: callers hand it object file bytes and receive
//! archive or universal binary bytes back, which keeps every transform
//! reproducible and unit-testable on any host.
//!
//! # Modules
//!
//! - [`arch`] - The supported CPU architectures and their Mach-O codes
//! - [`archive`] - Deterministic BSD `ar` static library writer and reader
//! - [`universal`] - Mach-O universal ("fat") binary fuse, thin, and listing
//! - [`error`] - Error types for both codecs

pub mod arch;
pub mod archive;
pub mod error;
pub mod universal;

pub use arch::Architecture;
pub use archive::{ArchiveBuilder, ArchiveMember, is_archive, read_members};
pub use error::{ArchiveError, UniversalError};
pub use universal::{FatArch, ThinSlice, fuse, is_universal, list_slices, thin};

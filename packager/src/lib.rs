//! xcpack packager library.
//!
//! This crate turns a vendor archive of prebuilt xcframeworks and a source
//! repository built for two architectures into individually zipped,
//! checksummed bundles plus a `Package.swift` that references them by URL
//! and checksum. It is used by the `xcpack` binary and can be driven
//! programmatically with fake executors and downloaders for testing.
//!
//! # Modules
//!
//! - [`artefact`] - Artefact names, header flattening, bundle layout, and assembly
//! - [`builder`] - Per-architecture builds and object collection
//! - [`checksum`] - The persisted `checksums.txt` record
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - `xcpack.toml` loading, validation, and overrides
//! - [`error`] - Semantic error types
//! - [`fetch`] - Prebuilt downloads, zip extraction, and source checkout
//! - [`inspect`] - Slice and member listings for universal binaries
//! - [`manifest`] - Product graph and `Package.swift` rendering
//! - [`packaging`] - Deterministic zips and checksum recording
//! - [`pipeline`] - Stage orchestration
//! - [`verify`] - Output verification against the checksum record
//! - [`workdir`] - Locked, freshly wiped working directories

pub mod artefact;
pub mod builder;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetch;
pub mod inspect;
pub mod manifest;
pub mod packaging;
pub mod pipeline;
pub mod verify;
pub mod workdir;

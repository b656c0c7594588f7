//! Artefact naming, assembly, and bundle layout.
//!
//! - [`name`] - Validated artefact names and derived file names
//! - [`headers`] - Public header flattening with collision detection
//! - [`bundle`] - Framework and xcframework layout and property lists
//! - [`assembler`] - Per-architecture archiving and universal fusing
//! - [`prebuilt`] - Discovery and staging of vendor xcframeworks

pub mod assembler;
pub mod bundle;
pub mod headers;
pub mod name;
pub mod prebuilt;

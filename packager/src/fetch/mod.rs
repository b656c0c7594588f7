//! Retrieval of the pipeline's two inputs.
//!
//! - [`download`] - HTTP download of the vendor archive with bounded retries
//! - [`extraction`] - Zip extraction with path traversal protection
//! - [`source`] - Shallow exact-tag checkout of the source repository

pub mod download;
pub mod extraction;
pub mod source;

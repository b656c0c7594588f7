//! Shared infrastructure for the xcpack workspace.
//!
//! Provides the external-process abstraction used by the fetcher and the
//! per-architecture builder, and the validated SHA-256 digest type shared
//! by packaging, manifest generation, and verification.

pub mod command;
pub mod digest;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use command::{
    CommandError, CommandExecutor, CommandSpec, SystemCommandExecutor, run_checked,
};
pub use digest::{DigestError, Sha256Digest, compute_sha256, sha256_of_bytes};

//! Error types for the xcpack packager.
//!
//! Each stage of the pipeline has its own error enum in the module that
//! owns it; [`PackagerError`] gathers them so the binary can report any
//! fatal failure with a single `error: ...` line and exit status 1.
//! Recoverable conditions (missing optional headers, resource bundles,
//! optional artefacts and checksums) never reach this type: they are
//! logged as warnings where they occur.

use crate::checksum::ChecksumError;
use crate::config::ConfigError;
use crate::fetch::download::DownloadError;
use crate::fetch::extraction::ExtractionError;
use crate::manifest::ManifestError;
use std::path::PathBuf;
use thiserror::Error;
use xcpack_common::{CommandError, DigestError};
use xcpack_fatbin::{Architecture, ArchiveError, UniversalError};

/// Errors that abort a packaging run.
#[derive(Debug, Error)]
pub enum PackagerError {
    /// The configuration file is missing, unparsable, or inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The prebuilt archive could not be retrieved.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// The prebuilt archive could not be unpacked.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// An external tool failed, timed out, or could not be started.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// A file digest could not be computed.
    #[error(transparent)]
    Digest(#[from] DigestError),

    /// The checksum record could not be read or written.
    #[error(transparent)]
    Checksum(#[from] ChecksumError),

    /// The product graph is invalid or the manifest could not be written.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Another run already owns the working directory.
    #[error(
        "working directory {} is locked by another xcpack run (lock file {})",
        path.display(),
        lock.display()
    )]
    WorkDirLocked {
        /// The working directory.
        path: PathBuf,
        /// The advisory lock file.
        lock: PathBuf,
    },

    /// The source checkout at the requested tag failed.
    #[error("failed to check out {repository} at tag {tag}: {source}")]
    SourceCheckout {
        /// Repository URL.
        repository: String,
        /// Requested tag.
        tag: String,
        /// The underlying git failure.
        #[source]
        source: Box<CommandError>,
    },

    /// The build tool failed for one architecture.
    #[error("{architecture} build failed: {source}")]
    Build {
        /// The architecture being built.
        architecture: Architecture,
        /// The underlying command failure.
        #[source]
        source: CommandError,
    },

    /// The build tool succeeded but produced no release directory.
    #[error("{architecture} build produced no release directory at {}", path.display())]
    MissingReleaseDir {
        /// The architecture being built.
        architecture: Architecture,
        /// Where the release directory was expected.
        path: PathBuf,
    },

    /// A build thread panicked.
    #[error("{architecture} build thread panicked")]
    BuildPanicked {
        /// The architecture being built.
        architecture: Architecture,
    },

    /// A required artefact has no objects for one architecture.
    #[error("artefact {artefact} has no {architecture} objects for module {module}")]
    MissingBuildOutput {
        /// The artefact being assembled.
        artefact: String,
        /// The architecture lacking output.
        architecture: Architecture,
        /// The module whose objects are missing.
        module: String,
    },

    /// Two header sources provide a header with the same file name.
    #[error(
        "header {file_name} is provided by both {} and {}; \
         set assembly.header_collisions = \"overwrite\" to keep the last one",
        first.display(),
        second.display()
    )]
    HeaderCollision {
        /// The colliding file name.
        file_name: String,
        /// The header copied first.
        first: PathBuf,
        /// The header that would replace it.
        second: PathBuf,
    },

    /// Writing a per-architecture static library failed.
    #[error("failed to archive {architecture} objects for {artefact}: {source}")]
    Archive {
        /// The artefact being assembled.
        artefact: String,
        /// The architecture of the archive.
        architecture: Architecture,
        /// The codec failure.
        #[source]
        source: ArchiveError,
    },

    /// Fusing per-architecture libraries failed.
    #[error("failed to build universal binary for {artefact}: {source}")]
    Universal {
        /// The artefact being assembled.
        artefact: String,
        /// The codec failure.
        #[source]
        source: UniversalError,
    },

    /// A prebuilt bundle named in the include list is absent.
    #[error("prebuilt archive has no {name}.xcframework")]
    PrebuiltNotFound {
        /// The missing bundle name.
        name: String,
    },

    /// An artefact or bundle name is not usable as a file name.
    #[error("invalid artefact name \"{name}\": {reason}")]
    InvalidName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// Nothing was assembled, so there is nothing to package.
    #[error("no bundles were assembled; check the [prebuilt] and [[artefacts]] configuration")]
    NothingToPackage,

    /// Writing a zip archive failed.
    #[error("failed to write zip archive {}: {reason}", path.display())]
    Zip {
        /// The archive being written.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// Packaged archives do not match the checksum record.
    #[error("{count} packaged archive(s) failed verification")]
    VerificationFailed {
        /// Number of mismatched or missing archives.
        count: usize,
    },

    /// The input given to `inspect` is neither an archive nor a universal binary.
    #[error("{} is neither a static archive nor a universal binary", path.display())]
    UnrecognisedBinary {
        /// The inspected file.
        path: PathBuf,
    },

    /// The input given to `inspect` is recognised but corrupt.
    #[error("{} is malformed: {reason}", path.display())]
    Malformed {
        /// The inspected file.
        path: PathBuf,
        /// The codec's description of the problem.
        reason: String,
    },

    /// JSON output could not be produced.
    #[error("failed to serialise JSON output: {0}")]
    Json(#[from] serde_json::Error),

    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl PackagerError {
    /// Attach `path` to an I/O error.
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Result type for packager operations.
pub type Result<T> = std::result::Result<T, PackagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_collision_names_both_sources() {
        let err = PackagerError::HeaderCollision {
            file_name: "Common.h".to_owned(),
            first: PathBuf::from("Alpha/Public/Common.h"),
            second: PathBuf::from("Beta/Public/Common.h"),
        };
        let msg = err.to_string();
        assert!(msg.contains("Alpha/Public/Common.h"));
        assert!(msg.contains("Beta/Public/Common.h"));
        assert!(msg.contains("overwrite"));
    }

    #[test]
    fn missing_build_output_names_architecture_and_module() {
        let err = PackagerError::MissingBuildOutput {
            artefact: "Alpha".to_owned(),
            architecture: Architecture::X86_64,
            module: "AlphaCore".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "artefact Alpha has no x86_64 objects for module AlphaCore"
        );
    }

    #[test]
    fn io_helper_attaches_path() {
        let err = PackagerError::io("/tmp/missing")(std::io::Error::from(
            std::io::ErrorKind::NotFound,
        ));
        assert!(err.to_string().contains("/tmp/missing"));
    }
}

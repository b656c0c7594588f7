//! Swift package manifest generation.
//!
//! The manifest is resolved from three inputs: the `[package]` identity,
//! the validated [`graph::DependencyGraph`], and the checksum record
//! written by packaging. Resolution never fails on a missing checksum:
//! the artefact is reported with a warning and rendered with an empty
//! checksum, which the package manager rejects at resolve time.
//!
//! - [`graph`] - Typed product and wrapper dependencies
//! - [`swift`] - `Package.swift` rendering and source stubs

pub mod graph;
pub mod swift;

use crate::artefact::name::ArtefactName;
use crate::checksum::ChecksumRecord;
use crate::config::PackageSection;
use graph::{DependencyGraph, TargetSpec};
use log::warn;
use std::path::PathBuf;
use thiserror::Error;
use xcpack_common::Sha256Digest;

/// Errors arising from building or writing the manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A product, wrapper, or binary name is declared more than once.
    #[error("\"{name}\" is declared more than once in the product graph")]
    DuplicateName {
        /// The repeated name.
        name: String,
    },

    /// A product or wrapper lists the same dependency twice.
    #[error("{owner} lists dependency \"{name}\" more than once")]
    DuplicateDependency {
        /// The product or wrapper holding the list.
        owner: String,
        /// The repeated dependency.
        name: String,
    },

    /// A target reference names no wrapper.
    #[error("{owner} depends on unknown target \"{target}\"; declare it in [[wrappers]]")]
    UnknownTarget {
        /// The product or wrapper holding the reference.
        owner: String,
        /// The unresolved target name.
        target: String,
    },

    /// A binary reference is not a usable artefact name.
    #[error("{owner} depends on invalid binary name \"{name}\"")]
    InvalidBinary {
        /// The product or wrapper holding the reference.
        owner: String,
        /// The rejected name.
        name: String,
    },

    /// Wrappers depend on each other in a cycle.
    #[error("wrapper \"{name}\" depends on itself")]
    DependencyCycle {
        /// A wrapper on the cycle.
        name: String,
    },

    /// The manifest or a source stub could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Io {
        /// The file or directory being written.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A resolved `.binaryTarget` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryTarget {
    /// Artefact name, also the target name.
    pub name: ArtefactName,
    /// Download URL of `<Name>.zip`.
    pub url: String,
    /// Recorded checksum, if packaging produced one.
    pub checksum: Option<Sha256Digest>,
}

/// Everything `Package.swift` describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Swift package name.
    pub package_name: String,
    /// `swift-tools-version` header value.
    pub tools_version: String,
    /// `(SupportedPlatform spelling, version)` pairs.
    pub platforms: Vec<(String, String)>,
    /// Release tag the URLs point at.
    pub tag: String,
    /// Products in declaration order.
    pub products: Vec<TargetSpec>,
    /// Wrappers in declaration order.
    pub wrappers: Vec<TargetSpec>,
    /// Binary targets sorted by name.
    pub binaries: Vec<BinaryTarget>,
}

impl Manifest {
    /// Resolve the manifest for `tag`, with archive URLs under `base_url`.
    ///
    /// Logs a warning for each binary without a recorded checksum.
    #[must_use]
    pub fn resolve(
        package: &PackageSection,
        graph: &DependencyGraph,
        checksums: &ChecksumRecord,
        base_url: &str,
        tag: &str,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        let binaries = graph
            .binary_artefacts()
            .into_iter()
            .map(|name| {
                let checksum = checksums.get_for_artefact(&name).cloned();
                if checksum.is_none() {
                    warn!(
                        "no checksum recorded for binary artefact {name}; \
                         the manifest will fail to resolve until it is packaged"
                    );
                }
                BinaryTarget {
                    url: format!("{base}/{}", name.zip_file_name()),
                    name,
                    checksum,
                }
            })
            .collect();

        Self {
            package_name: package.name.clone(),
            tools_version: package.swift_tools_version.clone(),
            platforms: package
                .platforms
                .iter()
                .filter_map(|p| p.swift_name().map(|s| (s.to_owned(), p.version.clone())))
                .collect(),
            tag: tag.to_owned(),
            products: graph.products().to_vec(),
            wrappers: graph.wrappers().to_vec(),
            binaries,
        }
    }

    /// Binary targets rendered without a checksum.
    #[must_use]
    pub fn missing_checksums(&self) -> Vec<&ArtefactName> {
        self.binaries
            .iter()
            .filter(|b| b.checksum.is_none())
            .map(|b| &b.name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graph::Dependency;
    use xcpack_common::sha256_of_bytes;

    fn package() -> PackageSection {
        toml::from_str(
            "name = \"Vendor\"\nplatforms = [{ name = \"ios\", version = \"13.0\" }]\n",
        )
        .expect("package section")
    }

    fn graph() -> DependencyGraph {
        DependencyGraph::new(
            vec![TargetSpec {
                name: "VendorCoreProduct".to_owned(),
                dependencies: vec![
                    Dependency::Binary("VendorCore".to_owned()),
                    Dependency::Binary("Alpha".to_owned()),
                ],
            }],
            Vec::new(),
        )
        .expect("graph")
    }

    #[test]
    fn resolves_urls_and_checksums() {
        let mut record = ChecksumRecord::new();
        record
            .insert("VendorCore.zip", sha256_of_bytes(b"core"))
            .expect("insert");
        let manifest = Manifest::resolve(
            &package(),
            &graph(),
            &record,
            "https://github.com/acme/vendor/releases/download/11.0.0/",
            "11.0.0",
        );

        assert_eq!(manifest.platforms, vec![("iOS".to_owned(), "13.0".to_owned())]);
        let names: Vec<&str> = manifest.binaries.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "VendorCore"]);
        assert_eq!(
            manifest.binaries[1].url,
            "https://github.com/acme/vendor/releases/download/11.0.0/VendorCore.zip"
        );
        assert_eq!(manifest.binaries[1].checksum, Some(sha256_of_bytes(b"core")));
        let missing: Vec<&str> = manifest
            .missing_checksums()
            .into_iter()
            .map(ArtefactName::as_str)
            .collect();
        assert_eq!(missing, vec!["Alpha"]);
    }
}

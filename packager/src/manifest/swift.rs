//! `Package.swift` rendering.
//!
//! Each product `P` becomes `.library(name: "P", targets: ["PTarget"])`
//! backed by a source target `PTarget` that depends on the product's
//! binaries and wrappers. Wrappers become plain source targets, and every
//! binary artefact becomes one `.binaryTarget`. Source targets need at
//! least one Swift file, so a stub is written for each.

use super::graph::{Dependency, TargetSpec, product_target_name};
use super::{Manifest, ManifestError};
use crate::artefact::name::ArtefactName;
use log::info;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the generated manifest file.
pub const PACKAGE_SWIFT: &str = "Package.swift";

/// Directory holding the source targets.
const SOURCES_DIR: &str = "Sources";

const INDENT: &str = "    ";

/// Files written by [`write_manifest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedManifest {
    /// The `Package.swift` path.
    pub package_swift: PathBuf,
    /// Source stubs, one per product target and wrapper.
    pub stubs: Vec<PathBuf>,
    /// Binaries rendered without a checksum.
    pub missing_checksums: Vec<ArtefactName>,
}

/// Render `manifest` as `Package.swift` source.
#[must_use]
pub fn render_package_swift(manifest: &Manifest) -> String {
    PackageSwift(manifest).to_string()
}

/// Display adapter producing the `Package.swift` text.
struct PackageSwift<'a>(&'a Manifest);

impl fmt::Display for PackageSwift<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let manifest = self.0;
        writeln!(f, "// swift-tools-version:{}", manifest.tools_version)?;
        writeln!(
            f,
            "// Generated by xcpack for release {}. Do not edit.",
            manifest.tag
        )?;
        writeln!(f)?;
        writeln!(f, "import PackageDescription")?;
        writeln!(f)?;
        writeln!(f, "let package = Package(")?;
        writeln!(f, "{INDENT}name: {},", quote(&manifest.package_name))?;

        if !manifest.platforms.is_empty() {
            writeln!(f, "{INDENT}platforms: [")?;
            for (platform, version) in &manifest.platforms {
                writeln!(f, "{INDENT}{INDENT}.{platform}({}),", quote(version))?;
            }
            writeln!(f, "{INDENT}],")?;
        }

        writeln!(f, "{INDENT}products: [")?;
        for product in &manifest.products {
            writeln!(f, "{INDENT}{INDENT}.library(")?;
            writeln!(f, "{INDENT}{INDENT}{INDENT}name: {},", quote(&product.name))?;
            writeln!(
                f,
                "{INDENT}{INDENT}{INDENT}targets: [{}]",
                quote(&product_target_name(&product.name))
            )?;
            writeln!(f, "{INDENT}{INDENT}),")?;
        }
        writeln!(f, "{INDENT}],")?;

        writeln!(f, "{INDENT}targets: [")?;
        for product in &manifest.products {
            render_source_target(f, &product_target_name(&product.name), product)?;
        }
        for wrapper in &manifest.wrappers {
            render_source_target(f, &wrapper.name, wrapper)?;
        }
        for binary in &manifest.binaries {
            let checksum = binary.checksum.as_ref().map_or("", |c| c.as_str());
            writeln!(f, "{INDENT}{INDENT}.binaryTarget(")?;
            writeln!(f, "{INDENT}{INDENT}{INDENT}name: {},", quote(binary.name.as_str()))?;
            writeln!(f, "{INDENT}{INDENT}{INDENT}url: {},", quote(&binary.url))?;
            writeln!(f, "{INDENT}{INDENT}{INDENT}checksum: {}", quote(checksum))?;
            writeln!(f, "{INDENT}{INDENT}),")?;
        }
        writeln!(f, "{INDENT}]")?;
        writeln!(f, ")")
    }
}

fn render_source_target(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    spec: &TargetSpec,
) -> fmt::Result {
    writeln!(f, "{INDENT}{INDENT}.target(")?;
    writeln!(f, "{INDENT}{INDENT}{INDENT}name: {},", quote(name))?;
    writeln!(f, "{INDENT}{INDENT}{INDENT}dependencies: [")?;
    for dep in &spec.dependencies {
        writeln!(
            f,
            "{INDENT}{INDENT}{INDENT}{INDENT}.target(name: {}),",
            quote(dep.name())
        )?;
    }
    writeln!(f, "{INDENT}{INDENT}{INDENT}],")?;
    writeln!(
        f,
        "{INDENT}{INDENT}{INDENT}path: {}",
        quote(&format!("{SOURCES_DIR}/{name}"))
    )?;
    writeln!(f, "{INDENT}{INDENT}),")
}

/// A Swift string literal for `value`.
fn quote(value: &str) -> String {
    let mut literal = String::with_capacity(value.len() + 2);
    literal.push('"');
    for ch in value.chars() {
        match ch {
            '"' => literal.push_str("\\\""),
            '\\' => literal.push_str("\\\\"),
            _ => literal.push(ch),
        }
    }
    literal.push('"');
    literal
}

fn stub_source(name: &str, spec: &TargetSpec) -> String {
    let mut out = format!("// Generated by xcpack. {name} links:\n");
    for dep in &spec.dependencies {
        let kind = match dep {
            Dependency::Binary(_) => "binary",
            Dependency::Target(_) => "target",
        };
        out.push_str(&format!("//   {kind} {}\n", dep.name()));
    }
    out
}

/// Write `Package.swift` and the source stubs under `root`.
///
/// An existing `Package.swift` is replaced entirely.
///
/// # Errors
///
/// Returns [`ManifestError::Io`] when a file cannot be written.
pub fn write_manifest(
    root: &Path,
    manifest: &Manifest,
) -> Result<GeneratedManifest, ManifestError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| ManifestError::Io { path, source }
    };
    fs::create_dir_all(root).map_err(io_err(root))?;

    let targets = manifest
        .products
        .iter()
        .map(|p| (product_target_name(&p.name), p))
        .chain(manifest.wrappers.iter().map(|w| (w.name.clone(), w)));
    let mut stubs = Vec::new();
    for (name, spec) in targets {
        let dir = root.join(SOURCES_DIR).join(&name);
        fs::create_dir_all(&dir).map_err(io_err(&dir))?;
        let stub = dir.join(format!("{name}.swift"));
        fs::write(&stub, stub_source(&name, spec)).map_err(io_err(&stub))?;
        stubs.push(stub);
    }

    let package_swift = root.join(PACKAGE_SWIFT);
    fs::write(&package_swift, render_package_swift(manifest)).map_err(io_err(&package_swift))?;
    info!(
        "wrote {} ({} product(s), {} binary target(s))",
        package_swift.display(),
        manifest.products.len(),
        manifest.binaries.len()
    );

    Ok(GeneratedManifest {
        package_swift,
        stubs,
        missing_checksums: manifest.missing_checksums().into_iter().cloned().collect(),
    })
}

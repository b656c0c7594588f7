//! Universal artefact assembly.
//!
//! Turns the per-architecture build outputs for one artefact into
//! `<stage>/<Name>.xcframework`: archive the artefact's modules per
//! architecture, fuse the archives into one universal static library,
//! flatten headers, and lay out the framework and xcframework bundles.

use crate::artefact::bundle::{
    FrameworkSpec, LibrarySlice, framework_dir, headers_dir, write_framework,
    write_xcframework_info,
};
use crate::artefact::headers::flatten_headers;
use crate::builder::BuildOutput;
use crate::config::{ArtefactSpec, Config};
use crate::error::{PackagerError, Result};
use log::{info, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use xcpack_common::{CommandExecutor, CommandSpec, run_checked};
use xcpack_fatbin::{Architecture, ArchiveBuilder, ThinSlice, fuse};

/// Shared inputs for assembling every artefact of a run.
#[derive(Clone, Copy)]
pub struct AssemblyContext<'a> {
    /// Runs the optional `ranlib` command.
    pub executor: &'a dyn CommandExecutor,
    /// The loaded configuration.
    pub config: &'a Config,
    /// Source checkout that header paths are relative to.
    pub source_dir: &'a Path,
    /// Directory receiving `<Name>.xcframework` bundles.
    pub stage_dir: &'a Path,
    /// Bundle version for artefacts without an explicit one.
    pub default_version: &'a str,
}

/// Result of assembling one artefact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyOutcome {
    /// The xcframework was written to this path.
    Assembled(PathBuf),
    /// An optional artefact was skipped because its objects are missing.
    Skipped,
}

/// The objects of one artefact for one architecture, in archive order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectureObjects {
    /// The architecture.
    pub architecture: Architecture,
    /// `(module, object path)` pairs, in module declaration order.
    pub objects: Vec<(String, PathBuf)>,
}

/// Pick the artefact's modules out of every required architecture's
/// build output.
///
/// # Errors
///
/// Returns [`PackagerError::MissingBuildOutput`] when any architecture
/// lacks output for any of the artefact's modules.
pub fn select_objects(
    spec: &ArtefactSpec,
    outputs: &[BuildOutput],
    architectures: &[Architecture],
) -> Result<Vec<ArchitectureObjects>> {
    let modules = spec.module_names();
    architectures
        .iter()
        .map(|&architecture| {
            let output = outputs.iter().find(|o| o.architecture == architecture);
            let mut objects = Vec::new();
            for module in &modules {
                let found = output
                    .and_then(|o| o.objects_for(module))
                    .ok_or_else(|| PackagerError::MissingBuildOutput {
                        artefact: spec.name.to_string(),
                        architecture,
                        module: module.clone(),
                    })?;
                objects.extend(found.iter().map(|p| (module.clone(), p.clone())));
            }
            Ok(ArchitectureObjects {
                architecture,
                objects,
            })
        })
        .collect()
}

/// Assemble one artefact into `<stage>/<Name>.xcframework`.
///
/// A required artefact missing objects for either architecture fails the
/// run; an optional one is skipped with a warning. Missing headers and
/// resource bundles only warn.
///
/// # Errors
///
/// Returns [`PackagerError`] for missing required objects, header
/// collisions, codec failures, `ranlib` failures, and I/O errors.
pub fn assemble_artefact(
    ctx: &AssemblyContext<'_>,
    spec: &ArtefactSpec,
    outputs: &[BuildOutput],
) -> Result<AssemblyOutcome> {
    let architectures = ctx.config.platform.sorted_architectures();
    let selected = match select_objects(spec, outputs, &architectures) {
        Ok(selected) => selected,
        Err(err @ PackagerError::MissingBuildOutput { .. }) if spec.optional => {
            warn!("skipping optional artefact {}: {err}", spec.name);
            return Ok(AssemblyOutcome::Skipped);
        }
        Err(err) => return Err(err),
    };

    let mut libraries = Vec::with_capacity(selected.len());
    for arch_objects in &selected {
        let library = archive_objects(ctx, spec, arch_objects)?;
        libraries.push((arch_objects.architecture, library));
    }
    let slices: Vec<ThinSlice<'_>> = libraries
        .iter()
        .map(|(architecture, bytes)| ThinSlice {
            architecture: *architecture,
            bytes,
        })
        .collect();
    let binary = fuse(&slices).map_err(|source| PackagerError::Universal {
        artefact: spec.name.to_string(),
        source,
    })?;

    let xcframework = ctx.stage_dir.join(spec.name.xcframework_dir_name());
    if xcframework.exists() {
        fs::remove_dir_all(&xcframework).map_err(PackagerError::io(&xcframework))?;
    }
    let slice = LibrarySlice {
        platform: ctx.config.platform.os.clone(),
        variant: ctx.config.platform.variant.clone(),
        architectures: architectures.clone(),
    };
    let library_dir = xcframework.join(slice.identifier());

    let sources: Vec<PathBuf> = spec
        .headers
        .iter()
        .map(|h| ctx.source_dir.join(h.as_std_path()))
        .collect();
    let headers = flatten_headers(
        &sources,
        &headers_dir(&library_dir, &spec.name),
        ctx.config.assembly.header_collisions,
    )?;
    if !spec.headers.is_empty() && headers.is_empty() {
        warn!(
            "artefact {}: no headers found in the configured header paths",
            spec.name
        );
    }

    let version = spec
        .version
        .as_deref()
        .unwrap_or(ctx.default_version)
        .trim_start_matches('v');
    let framework = FrameworkSpec {
        name: &spec.name,
        binary: &binary,
        bundle_identifier: format!(
            "{}.{}",
            ctx.config.package.bundle_identifier_prefix, spec.name
        ),
        version,
        minimum_os_version: &ctx.config.platform.deployment_target,
    };
    write_framework(&framework, &headers, &library_dir)?;

    if let Some(bundle) = &spec.resource_bundle {
        copy_resource_bundle(spec, bundle, outputs, &framework_dir(&library_dir, &spec.name))?;
    }

    write_xcframework_info(&xcframework, &spec.name, &slice)?;
    info!(
        "assembled {} ({} bytes, {})",
        xcframework.display(),
        binary.len(),
        slice.identifier()
    );
    Ok(AssemblyOutcome::Assembled(xcframework))
}

/// Build the static library for one architecture.
fn archive_objects(
    ctx: &AssemblyContext<'_>,
    spec: &ArtefactSpec,
    arch_objects: &ArchitectureObjects,
) -> Result<Vec<u8>> {
    let architecture = arch_objects.architecture;
    let archive_err = |source| PackagerError::Archive {
        artefact: spec.name.to_string(),
        architecture,
        source,
    };

    let mut builder = ArchiveBuilder::new();
    let mut used = BTreeSet::new();
    for (module, path) in &arch_objects.objects {
        let data = fs::read(path).map_err(PackagerError::io(path))?;
        let member = unique_member_name(module, path, &mut used);
        builder.append(&member, data).map_err(archive_err)?;
    }
    let library = builder.finish().map_err(archive_err)?;

    run_ranlib(ctx, spec, architecture, &ctx.config.assembly.ranlib, library)
}

/// Member name for an object: its file name, or `<module>_<file name>`
/// when two modules contribute objects with the same name.
fn unique_member_name(module: &str, path: &Path, used: &mut BTreeSet<String>) -> String {
    let file_name = path
        .file_name()
        .map_or_else(|| "object.o".to_owned(), |n| n.to_string_lossy().into_owned());
    let mut candidate = file_name.clone();
    let mut counter = 1;
    while used.contains(&candidate) {
        candidate = if counter == 1 {
            format!("{module}_{file_name}")
        } else {
            format!("{module}_{counter}_{file_name}")
        };
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Run the configured `ranlib` command on a temporary copy of `library`.
fn run_ranlib(
    ctx: &AssemblyContext<'_>,
    spec: &ArtefactSpec,
    architecture: Architecture,
    command: &[String],
    library: Vec<u8>,
) -> Result<Vec<u8>> {
    let Some((program, args)) = command.split_first() else {
        warn!(
            "artefact {}: ranlib disabled, the {architecture} library has no table of contents",
            spec.name
        );
        return Ok(library);
    };
    let temp = tempfile::Builder::new()
        .prefix("xcpack-")
        .suffix(".a")
        .tempfile_in(ctx.stage_dir)
        .map_err(PackagerError::io(ctx.stage_dir))?;
    fs::write(temp.path(), &library).map_err(PackagerError::io(temp.path()))?;
    let spec = CommandSpec::new(program)
        .args(args)
        .arg(temp.path().to_string_lossy())
        .timeout(ctx.config.build.timeout());
    run_checked(ctx.executor, &spec)?;
    fs::read(temp.path()).map_err(PackagerError::io(temp.path()))
}

fn copy_resource_bundle(
    spec: &ArtefactSpec,
    bundle: &str,
    outputs: &[BuildOutput],
    framework: &Path,
) -> Result<()> {
    let found = outputs
        .iter()
        .map(|o| o.release_dir.join(bundle))
        .find(|p| p.is_dir());
    let Some(source) = found else {
        warn!(
            "artefact {}: resource bundle {bundle} not found in build output; continuing without it",
            spec.name
        );
        return Ok(());
    };
    copy_tree(&source, &framework.join(bundle))
}

/// Recursively copy `source` to `dest`, recreating symbolic links.
pub(crate) fn copy_tree(source: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| PackagerError::Io {
            path: source.to_path_buf(),
            source: e.into(),
        })?;
        let rel = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = dest.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(PackagerError::io(&target))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(PackagerError::io(entry.path()))?;
            make_symlink(&link, &target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(PackagerError::io(entry.path()))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path) -> Result<()> {
    std::os::unix::fs::symlink(link, target).map_err(PackagerError::io(target))
}

#[cfg(not(unix))]
fn make_symlink(link: &Path, target: &Path) -> Result<()> {
    warn!(
        "symbolic link {} -> {} not recreated on this platform",
        target.display(),
        link.display()
    );
    Ok(())
}

#[cfg(test)]
#[path = "assembler_tests.rs"]
mod tests;

//! Per-architecture builds of the source checkout.
//!
//! Each architecture is built with its own scratch directory:
//!
//! ```text
//! swift build -c release --triple <triple> --scratch-path <scratch>/<arch> [--sdk <sdk>]
//! ```
//!
//! Objects are then collected from
//! `<scratch>/<arch>/<build-triple>/release/<Module>.build/**/*.o`, keyed by
//! module so that assembly can pick exactly the modules belonging to one
//! artefact.

use crate::config::{BuildSection, PlatformSection};
use crate::error::{PackagerError, Result};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use xcpack_common::{CommandError, CommandExecutor, CommandSpec, run_checked};
use xcpack_fatbin::Architecture;

/// Suffix of the per-module object directories the build tool writes.
const MODULE_DIR_SUFFIX: &str = ".build";

/// An Apple target triple such as `arm64-apple-ios13.0-simulator`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Triple {
    architecture: Architecture,
    os: String,
    version: String,
    variant: Option<String>,
}

impl Triple {
    /// Build the triple for `architecture` on the configured platform.
    #[must_use]
    pub fn new(architecture: Architecture, platform: &PlatformSection) -> Self {
        Self {
            architecture,
            os: platform.triple_os().to_owned(),
            version: platform.deployment_target.clone(),
            variant: platform.variant.clone(),
        }
    }

    /// The directory name the build tool uses under its scratch path.
    ///
    /// This is the triple without the deployment version.
    ///
    /// # Examples
    ///
    /// ```
    /// use xcpack_fatbin::Architecture;
    /// use xcpack_packager::builder::Triple;
    /// use xcpack_packager::config::PlatformSection;
    ///
    /// let platform = PlatformSection {
    ///     os: "ios".to_owned(),
    ///     deployment_target: "13.0".to_owned(),
    ///     variant: Some("simulator".to_owned()),
    ///     architectures: Architecture::ALL.to_vec(),
    /// };
    /// let triple = Triple::new(Architecture::Arm64, &platform);
    /// assert_eq!(triple.to_string(), "arm64-apple-ios13.0-simulator");
    /// assert_eq!(triple.build_dir_name(), "arm64-apple-ios-simulator");
    /// ```
    #[must_use]
    pub fn build_dir_name(&self) -> String {
        let mut name = format!("{}-apple-{}", self.architecture, self.os);
        if let Some(variant) = &self.variant {
            name.push('-');
            name.push_str(variant);
        }
        name
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-apple-{}{}", self.architecture, self.os, self.version)?;
        if let Some(variant) = &self.variant {
            write!(f, "-{variant}")?;
        }
        Ok(())
    }
}

/// Compiled objects for one architecture, grouped by module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// The architecture the objects were compiled for.
    pub architecture: Architecture,
    /// The build tool's release directory.
    pub release_dir: PathBuf,
    /// Object files per module, each list sorted by path.
    pub modules: BTreeMap<String, Vec<PathBuf>>,
}

impl BuildOutput {
    /// Scan `release_dir` for per-module object files.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::MissingReleaseDir`] when the directory does
    /// not exist and [`PackagerError::Io`] when it cannot be read.
    pub fn collect(architecture: Architecture, release_dir: &Path) -> Result<Self> {
        if !release_dir.is_dir() {
            return Err(PackagerError::MissingReleaseDir {
                architecture,
                path: release_dir.to_path_buf(),
            });
        }

        let mut modules = BTreeMap::new();
        let entries = std::fs::read_dir(release_dir).map_err(PackagerError::io(release_dir))?;
        for entry in entries {
            let entry = entry.map_err(PackagerError::io(release_dir))?;
            let file_name = entry.file_name();
            let Some(module) = file_name
                .to_str()
                .and_then(|n| n.strip_suffix(MODULE_DIR_SUFFIX))
            else {
                continue;
            };
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let objects = collect_objects(&path)?;
            if objects.is_empty() {
                debug!("{architecture}: module {module} has no objects");
                continue;
            }
            modules.insert(module.to_owned(), objects);
        }

        Ok(Self {
            architecture,
            release_dir: release_dir.to_path_buf(),
            modules,
        })
    }

    /// Objects for `module`, if it was built.
    #[must_use]
    pub fn objects_for(&self, module: &str) -> Option<&[PathBuf]> {
        self.modules.get(module).map(Vec::as_slice)
    }
}

fn collect_objects(module_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut objects = Vec::new();
    for entry in WalkDir::new(module_dir).sort_by_file_name() {
        let entry = entry.map_err(|e| PackagerError::Io {
            path: module_dir.to_path_buf(),
            source: e.into(),
        })?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|e| e == "o") {
            objects.push(entry.into_path());
        }
    }
    Ok(objects)
}

/// Everything needed to build the checkout for each architecture.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    /// The source checkout.
    pub source_dir: &'a Path,
    /// Parent of the per-architecture scratch directories.
    pub scratch_root: &'a Path,
    /// Build tool settings.
    pub build: &'a BuildSection,
    /// Target platform.
    pub platform: &'a PlatformSection,
}

impl BuildRequest<'_> {
    /// Scratch directory for one architecture.
    #[must_use]
    pub fn scratch_dir(&self, architecture: Architecture) -> PathBuf {
        self.scratch_root.join(architecture.as_str())
    }

    /// The build tool invocation for one architecture.
    #[must_use]
    pub fn command(&self, architecture: Architecture) -> CommandSpec {
        let triple = Triple::new(architecture, self.platform);
        let scratch = self.scratch_dir(architecture);
        let mut spec = CommandSpec::new(&self.build.tool)
            .args(["build", "-c", "release", "--triple"])
            .arg(triple.to_string())
            .arg("--scratch-path")
            .arg(scratch.to_string_lossy())
            .current_dir(self.source_dir)
            .timeout(self.build.timeout());
        if let Some(sdk) = &self.build.sdk {
            spec = spec.arg("--sdk").arg(sdk.as_str());
        }
        spec
    }

    /// Where the build leaves its release products for one architecture.
    #[must_use]
    pub fn release_dir(&self, architecture: Architecture) -> PathBuf {
        let triple = Triple::new(architecture, self.platform);
        self.scratch_dir(architecture)
            .join(triple.build_dir_name())
            .join("release")
    }
}

/// Build one architecture and collect its objects.
///
/// On timeout the partial scratch directory is removed.
///
/// # Errors
///
/// Returns [`PackagerError::Build`] when the tool fails and
/// [`PackagerError::MissingReleaseDir`] when it leaves no release output.
pub fn build_architecture(
    executor: &dyn CommandExecutor,
    request: &BuildRequest<'_>,
    architecture: Architecture,
) -> Result<BuildOutput> {
    let spec = request.command(architecture);
    info!("building {architecture}: {spec}");
    if let Err(source) = run_checked(executor, &spec) {
        if matches!(source, CommandError::TimedOut { .. }) {
            let scratch = request.scratch_dir(architecture);
            if let Err(e) = std::fs::remove_dir_all(&scratch) {
                warn!("could not remove partial build {}: {e}", scratch.display());
            }
        }
        return Err(PackagerError::Build {
            architecture,
            source,
        });
    }
    let output = BuildOutput::collect(architecture, &request.release_dir(architecture))?;
    info!(
        "{architecture}: collected objects for {} module(s)",
        output.modules.len()
    );
    Ok(output)
}

/// Build every architecture, concurrently when `request.build.parallel`.
///
/// Outputs are returned in the order of `architectures`. Both builds run
/// to completion before any error is reported.
///
/// # Errors
///
/// Returns the first failing architecture's error.
pub fn build_all(
    executor: &dyn CommandExecutor,
    request: &BuildRequest<'_>,
    architectures: &[Architecture],
) -> Result<Vec<BuildOutput>> {
    if !request.build.parallel {
        return architectures
            .iter()
            .map(|&arch| build_architecture(executor, request, arch))
            .collect();
    }

    let results: Vec<Result<BuildOutput>> = std::thread::scope(|scope| {
        let handles: Vec<_> = architectures
            .iter()
            .map(|&arch| (arch, scope.spawn(move || build_architecture(executor, request, arch))))
            .collect();
        handles
            .into_iter()
            .map(|(architecture, handle)| {
                handle
                    .join()
                    .unwrap_or(Err(PackagerError::BuildPanicked { architecture }))
            })
            .collect()
    });
    results.into_iter().collect()
}

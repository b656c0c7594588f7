//! Pipeline orchestration.
//!
//! Runs the stages in strict sequence: lock and wipe the working
//! directory, fetch and stage prebuilt bundles, check out and build the
//! source for both architectures, assemble each configured artefact, zip
//! and checksum every staged bundle, and finally render the manifest from
//! the checksum record. Packaging and manifest generation are separately
//! invocable; the checksum record is the only state they share.

use crate::artefact::assembler::{AssemblyContext, AssemblyOutcome, assemble_artefact};
use crate::artefact::name::ArtefactName;
use crate::artefact::prebuilt::{discover_prebuilt, stage_prebuilt};
use crate::builder::{BuildRequest, build_all};
use crate::checksum::{CHECKSUM_FILE_NAME, ChecksumRecord};
use crate::config::{Config, PrebuiltSection, SourceSection};
use crate::error::{PackagerError, Result};
use crate::fetch::download::{ArtefactDownloader, RetryPolicy, fetch_with_retry};
use crate::fetch::extraction::extract_zip;
use crate::fetch::source::clone_source;
use crate::manifest::Manifest;
use crate::manifest::graph::DependencyGraph;
use crate::manifest::swift::{GeneratedManifest, PACKAGE_SWIFT, write_manifest};
use crate::packaging::{PackageReport, combined_zip_name, package_all};
use crate::verify::{VerifyReport, verify_output};
use crate::workdir::{BUILD_DIR, SOURCE_DIR, WorkDir};
use log::{info, warn};
use std::fmt;
use std::path::Path;
use xcpack_common::CommandExecutor;

/// Collaborators and locations for one run.
pub struct Pipeline<'a> {
    config: &'a Config,
    executor: &'a dyn CommandExecutor,
    downloader: &'a dyn ArtefactDownloader,
    work_dir: &'a Path,
    output_dir: &'a Path,
    retry: RetryPolicy,
}

/// Outcome of a full run.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Packaging results.
    pub package: PackageReport,
    /// Manifest files written.
    pub manifest: GeneratedManifest,
}

/// The steps a run would take, for `--dry-run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// One line per step, in order.
    pub steps: Vec<String>,
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            writeln!(f, "{:>2}. {step}", index + 1)?;
        }
        Ok(())
    }
}

impl<'a> Pipeline<'a> {
    /// A pipeline retrying downloads `config.build.retries` times.
    #[must_use]
    pub fn new(
        config: &'a Config,
        executor: &'a dyn CommandExecutor,
        downloader: &'a dyn ArtefactDownloader,
        work_dir: &'a Path,
        output_dir: &'a Path,
    ) -> Self {
        Self {
            config,
            executor,
            downloader,
            work_dir,
            output_dir,
            retry: RetryPolicy::new(config.build.retries),
        }
    }

    /// Replace the download retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Describe what [`Self::package`] and, when `manifest_dir` is given,
    /// [`Self::generate_manifest`] would do, without side effects.
    #[must_use]
    pub fn plan(&self, manifest_dir: Option<&Path>) -> Plan {
        let config = self.config;
        let mut steps = vec![format!(
            "lock and wipe working directory {}",
            self.work_dir.display()
        )];

        if let Some(prebuilt) = &config.prebuilt {
            steps.push(format!(
                "download {} (up to {} attempt(s))",
                prebuilt.resolved_url(),
                self.retry.attempts
            ));
            let filter = if prebuilt.include.is_empty() {
                "all bundles".to_owned()
            } else {
                prebuilt
                    .include
                    .iter()
                    .map(ArtefactName::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            steps.push(format!("extract and stage prebuilt xcframeworks ({filter})"));
        }

        if let Some(source) = config.source.as_ref().filter(|_| !config.artefacts.is_empty()) {
            let source_dir = self.work_dir.join(SOURCE_DIR);
            let scratch_root = self.work_dir.join(BUILD_DIR);
            steps.push(format!("clone {} at {}", source.repository, source.tag));
            let request = BuildRequest {
                source_dir: &source_dir,
                scratch_root: &scratch_root,
                build: &config.build,
                platform: &config.platform,
            };
            for architecture in config.platform.sorted_architectures() {
                steps.push(format!("build: {}", request.command(architecture)));
            }
            for artefact in &config.artefacts {
                let optional = if artefact.optional { " (optional)" } else { "" };
                steps.push(format!(
                    "assemble {} from module(s) {}{optional}",
                    artefact.name.xcframework_dir_name(),
                    artefact.module_names().join(", ")
                ));
            }
        }

        steps.push(format!(
            "zip bundles into {}, write {} and {CHECKSUM_FILE_NAME}",
            self.output_dir.display(),
            combined_zip_name(&config.package.name)
        ));
        if let Some(dir) = manifest_dir {
            steps.push(format!("write {}", dir.join(PACKAGE_SWIFT).display()));
        }
        Plan { steps }
    }

    /// Fetch, build, assemble, zip, and record checksums.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of any stage. No checksum record is
    /// written unless every stage succeeds.
    pub fn package(&self) -> Result<PackageReport> {
        let config = self.config;
        let work = WorkDir::acquire(self.work_dir)?;
        info!("working in {}", work.path().display());

        let mut names = Vec::new();
        if let Some(prebuilt) = &config.prebuilt {
            names.extend(self.fetch_prebuilt(&work, prebuilt)?);
        }
        if let Some(source) = config.source.as_ref().filter(|_| !config.artefacts.is_empty()) {
            for name in self.build_from_source(&work, source)? {
                if names.contains(&name) {
                    warn!("{name} built from source replaces the prebuilt bundle");
                } else {
                    names.push(name);
                }
            }
        }

        package_all(
            &work.stage_dir(),
            &names,
            self.output_dir,
            &config.package.name,
        )
    }

    /// Render `Package.swift` and source stubs into `manifest_dir` from the
    /// checksum record in the output directory.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::Config`] without a release tag,
    /// [`PackagerError::Checksum`] when the record is unreadable, and
    /// [`PackagerError::Manifest`] for graph or write failures.
    pub fn generate_manifest(&self, manifest_dir: &Path) -> Result<GeneratedManifest> {
        let config = self.config;
        let tag = config.release.require_tag()?;
        let graph = self.graph()?;
        let record = ChecksumRecord::read(&self.output_dir.join(CHECKSUM_FILE_NAME))?;
        let manifest = Manifest::resolve(
            &config.package,
            &graph,
            &record,
            &config.release.base_url_for(tag),
            tag,
        );
        Ok(write_manifest(manifest_dir, &manifest)?)
    }

    /// [`Self::package`] followed by [`Self::generate_manifest`].
    ///
    /// The release tag and product graph are checked before any work is
    /// done.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; the manifest is not written when
    /// packaging fails.
    pub fn run(&self, manifest_dir: &Path) -> Result<RunReport> {
        self.config.release.require_tag()?;
        self.graph()?;
        let package = self.package()?;
        let manifest = self.generate_manifest(manifest_dir)?;
        Ok(RunReport { package, manifest })
    }

    /// Check the output directory against its checksum record.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::VerificationFailed`] when any recorded
    /// archive is missing or altered.
    pub fn verify(&self) -> Result<VerifyReport> {
        let combined = combined_zip_name(&self.config.package.name);
        verify_output(self.output_dir, &[combined])?.into_result()
    }

    fn graph(&self) -> Result<DependencyGraph> {
        Ok(DependencyGraph::new(
            self.config.products.clone(),
            self.config.wrappers.clone(),
        )?)
    }

    fn fetch_prebuilt(
        &self,
        work: &WorkDir,
        prebuilt: &PrebuiltSection,
    ) -> Result<Vec<ArtefactName>> {
        let archive = work.prebuilt_archive();
        fetch_with_retry(self.downloader, &prebuilt.resolved_url(), &archive, &self.retry)?;
        let extracted = work.prebuilt_dir();
        let files = extract_zip(&archive, &extracted)?;
        info!("extracted {} file(s) from {}", files.len(), archive.display());
        let bundles = discover_prebuilt(&extracted, &prebuilt.include)?;
        if bundles.is_empty() {
            warn!(
                "prebuilt archive {} contains no xcframeworks",
                prebuilt.resolved_url()
            );
        }
        stage_prebuilt(bundles, &work.stage_dir())
    }

    fn build_from_source(
        &self,
        work: &WorkDir,
        source: &SourceSection,
    ) -> Result<Vec<ArtefactName>> {
        let config = self.config;
        let source_dir = work.source_dir();
        clone_source(
            self.executor,
            &source.repository,
            &source.tag,
            &source_dir,
            config.build.timeout(),
        )?;

        let scratch_root = work.build_dir();
        let request = BuildRequest {
            source_dir: &source_dir,
            scratch_root: &scratch_root,
            build: &config.build,
            platform: &config.platform,
        };
        let outputs = build_all(
            self.executor,
            &request,
            &config.platform.sorted_architectures(),
        )?;

        let stage_dir = work.stage_dir();
        std::fs::create_dir_all(&stage_dir).map_err(PackagerError::io(&stage_dir))?;
        let ctx = AssemblyContext {
            executor: self.executor,
            config,
            source_dir: &source_dir,
            stage_dir: &stage_dir,
            default_version: &source.tag,
        };
        let mut assembled = Vec::new();
        for spec in &config.artefacts {
            match assemble_artefact(&ctx, spec, &outputs)? {
                AssemblyOutcome::Assembled(_) => assembled.push(spec.name.clone()),
                AssemblyOutcome::Skipped => {}
            }
        }
        Ok(assembled)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

//! CLI argument definitions for xcpack.
//!
//! This module defines the command-line interface using clap. It is kept
//! apart from the entrypoint so the binary stays focused on orchestration
//! and the parser can be tested in isolation.

use crate::config::{DEFAULT_CONFIG_FILE, VersionOverrides};
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Default working directory, relative to the current directory.
pub const DEFAULT_WORK_DIR: &str = ".xcpack/work";

/// Default output directory, relative to the current directory.
pub const DEFAULT_OUTPUT_DIR: &str = "dist";

/// Package prebuilt and source-built xcframeworks for Swift Package Manager.
#[derive(Parser, Debug)]
#[command(name = "xcpack")]
#[command(version, about)]
#[command(long_about = concat!(
    "Package prebuilt and source-built xcframeworks for Swift Package Manager.\n\n",
    "xcpack downloads a vendor archive of ready-made xcframeworks, builds a source ",
    "checkout for two architectures, fuses each artefact into a universal static ",
    "library wrapped in an xcframework, zips and checksums every bundle, and writes ",
    "a Package.swift whose binary targets point at the published zips.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Run the whole pipeline:\n",
    "    $ xcpack run --release-tag 11.0.0\n\n",
    "  Preview the steps without touching the filesystem:\n",
    "    $ xcpack run --dry-run\n\n",
    "  Regenerate the manifest from an existing checksums.txt:\n",
    "    $ xcpack manifest --release-tag 11.0.0\n\n",
    "  Check packaged zips against checksums.txt:\n",
    "    $ xcpack verify\n\n",
    "  List the slices of a universal library:\n",
    "    $ xcpack inspect Alpha.xcframework/ios-arm64_x86_64-simulator/Alpha.framework/Alpha\n",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file.
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_FILE,
        global = true
    )]
    pub config: Utf8PathBuf,

    /// Working directory, wiped at the start of every packaging run.
    #[arg(long, value_name = "DIR", default_value = DEFAULT_WORK_DIR, global = true)]
    pub work_dir: Utf8PathBuf,

    /// Directory receiving zips and checksums.txt.
    #[arg(
        short,
        long,
        value_name = "DIR",
        default_value = DEFAULT_OUTPUT_DIR,
        global = true
    )]
    pub output_dir: Utf8PathBuf,

    /// Increase log verbosity (repeatable: -v, -vv).
    #[arg(
        short,
        long = "verbose",
        action = clap::ArgAction::Count,
        conflicts_with = "quiet",
        global = true
    )]
    pub verbosity: u8,

    /// Only log warnings and errors.
    #[arg(short, long, conflicts_with = "verbosity", global = true)]
    pub quiet: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch, build, assemble, package, and write the manifest.
    Run(RunArgs),

    /// Fetch, build, assemble, and package, stopping after checksums.txt.
    Package(PackageArgs),

    /// Write Package.swift from checksums.txt and the configuration.
    Manifest(ManifestArgs),

    /// Check the packaged zips against checksums.txt.
    Verify(VerifyArgs),

    /// List the slices and archive members of a library.
    Inspect(InspectArgs),
}

/// Version identifiers that override the configuration file.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionArgs {
    /// Vendor release to download, replacing `prebuilt.version`.
    #[arg(long, value_name = "VERSION", env = "XCPACK_PREBUILT_VERSION")]
    pub prebuilt_version: Option<String>,

    /// Source tag to build, replacing `source.tag`.
    #[arg(long, value_name = "TAG", env = "XCPACK_SOURCE_TAG")]
    pub source_tag: Option<String>,

    /// Release tag the manifest points at, replacing `release.tag`.
    #[arg(long, value_name = "TAG", env = "XCPACK_RELEASE_TAG")]
    pub release_tag: Option<String>,
}

impl VersionArgs {
    /// The overrides to apply to the loaded configuration.
    #[must_use]
    pub fn overrides(&self) -> VersionOverrides {
        VersionOverrides {
            prebuilt_version: self.prebuilt_version.clone(),
            source_tag: self.source_tag.clone(),
            release_tag: self.release_tag.clone(),
        }
    }
}

/// Arguments for the run command.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Version overrides.
    #[command(flatten)]
    pub versions: VersionArgs,

    /// Print the steps and exit without side effects.
    #[arg(long)]
    pub dry_run: bool,

    /// Directory receiving Package.swift and the source stubs.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub manifest_dir: Utf8PathBuf,
}

/// Arguments for the package command.
#[derive(Args, Debug, Clone)]
pub struct PackageArgs {
    /// Version overrides.
    #[command(flatten)]
    pub versions: VersionArgs,

    /// Print the steps and exit without side effects.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the manifest command.
#[derive(Args, Debug, Clone)]
pub struct ManifestArgs {
    /// Release tag the manifest points at, replacing `release.tag`.
    #[arg(long, value_name = "TAG", env = "XCPACK_RELEASE_TAG")]
    pub release_tag: Option<String>,

    /// Directory receiving Package.swift and the source stubs.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub manifest_dir: Utf8PathBuf,
}

impl ManifestArgs {
    /// The overrides to apply to the loaded configuration.
    #[must_use]
    pub fn overrides(&self) -> VersionOverrides {
        VersionOverrides {
            release_tag: self.release_tag.clone(),
            ..VersionOverrides::default()
        }
    }
}

/// Arguments for the verify command.
#[derive(Args, Debug, Clone, Default)]
pub struct VerifyArgs {
    /// Output the report in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the inspect command.
#[derive(Args, Debug, Clone)]
pub struct InspectArgs {
    /// Universal binary or static archive to inspect.
    #[arg(value_name = "FILE")]
    pub file: Utf8PathBuf,

    /// Output the report in JSON format for scripting.
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// The log filter implied by `-v` and `-q`, if any.
    ///
    /// `None` leaves the choice to `RUST_LOG`.
    ///
    /// # Examples
    ///
    /// ```
    /// use clap::Parser;
    /// use xcpack_packager::cli::Cli;
    ///
    /// assert_eq!(Cli::parse_from(["xcpack", "verify"]).log_filter(), None);
    /// assert_eq!(Cli::parse_from(["xcpack", "-v", "verify"]).log_filter(), Some("debug"));
    /// assert_eq!(Cli::parse_from(["xcpack", "verify", "-q"]).log_filter(), Some("warn"));
    /// ```
    #[must_use]
    pub fn log_filter(&self) -> Option<&'static str> {
        if self.quiet {
            return Some("warn");
        }
        match self.verbosity {
            0 => None,
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

//! Configuration loading for `xcpack.toml`.
//!
//! The file describes where inputs come from (`[prebuilt]`, `[source]`),
//! how they are built and assembled (`[build]`, `[platform]`,
//! `[assembly]`, `[[artefacts]]`), and what the generated Swift package
//! exposes (`[package]`, `[release]`, `[[wrappers]]`, `[[products]]`).
//! Version identifiers may be overridden from the command line or the
//! environment through [`VersionOverrides`].

use crate::artefact::headers::CollisionPolicy;
use crate::artefact::name::ArtefactName;
use crate::manifest::graph::TargetSpec;
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use xcpack_fatbin::Architecture;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "xcpack.toml";

/// Errors arising from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The configuration path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("invalid configuration in {path}: {message}")]
    Parse {
        /// The configuration path.
        path: Utf8PathBuf,
        /// The parser's description, including the offending key.
        message: String,
    },

    /// A field has an unacceptable value.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A field required by the requested operation is unset.
    #[error("{field} is not set; {hint}")]
    Missing {
        /// Dotted path of the missing field.
        field: &'static str,
        /// How to supply it.
        hint: &'static str,
    },
}

/// The complete `xcpack.toml` document.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Swift package identity and supported platforms.
    pub package: PackageSection,
    /// Where packaged archives are published.
    pub release: ReleaseSection,
    /// Vendor archive of ready-made xcframeworks.
    #[serde(default)]
    pub prebuilt: Option<PrebuiltSection>,
    /// Source repository built per architecture.
    #[serde(default)]
    pub source: Option<SourceSection>,
    /// Build tool invocation.
    #[serde(default)]
    pub build: BuildSection,
    /// Target platform and architectures.
    pub platform: PlatformSection,
    /// Assembly policies.
    #[serde(default)]
    pub assembly: AssemblySection,
    /// Artefacts assembled from source builds.
    #[serde(default)]
    pub artefacts: Vec<ArtefactSpec>,
    /// Wrapper targets that group dependencies for products.
    #[serde(default)]
    pub wrappers: Vec<TargetSpec>,
    /// Library products exposed by the manifest.
    #[serde(default)]
    pub products: Vec<TargetSpec>,
}

/// `[package]`: Swift package identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    /// Package name written to `Package.swift`.
    pub name: String,
    /// The `swift-tools-version` header.
    #[serde(default = "default_tools_version")]
    pub swift_tools_version: String,
    /// Minimum platform versions declared by the package.
    #[serde(default)]
    pub platforms: Vec<PlatformVersion>,
    /// Prefix for framework bundle identifiers.
    #[serde(default = "default_bundle_prefix")]
    pub bundle_identifier_prefix: String,
}

/// One `{ name, version }` entry of `package.platforms`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformVersion {
    /// Platform name, such as `ios` or `macos`.
    pub name: String,
    /// Minimum version, such as `13.0`.
    pub version: String,
}

impl PlatformVersion {
    /// The `SupportedPlatform` spelling used in `Package.swift`.
    #[must_use]
    pub fn swift_name(&self) -> Option<&'static str> {
        swift_platform_name(&self.name)
    }
}

/// `[release]`: where the archives are published.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseSection {
    /// Repository in `owner/name` form.
    pub repository: String,
    /// Base URL template; `{repository}` and `{tag}` are substituted.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Release tag the manifest points at.
    #[serde(default)]
    pub tag: Option<String>,
}

impl ReleaseSection {
    /// The release tag, which the manifest cannot be generated without.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when no tag is configured.
    pub fn require_tag(&self) -> Result<&str, ConfigError> {
        self.tag.as_deref().ok_or(ConfigError::Missing {
            field: "release.tag",
            hint: "set it in the config, pass --release-tag, or export XCPACK_RELEASE_TAG",
        })
    }

    /// The resolved base URL for `tag`, without a trailing slash.
    #[must_use]
    pub fn base_url_for(&self, tag: &str) -> String {
        self.base_url
            .replace("{repository}", &self.repository)
            .replace("{tag}", tag)
            .trim_end_matches('/')
            .to_owned()
    }
}

/// `[prebuilt]`: the vendor archive.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrebuiltSection {
    /// Download URL template; `{version}` is substituted.
    pub url: String,
    /// Vendor release version.
    pub version: String,
    /// Bundle names to keep; all bundles are kept when empty.
    #[serde(default)]
    pub include: Vec<ArtefactName>,
}

impl PrebuiltSection {
    /// The download URL with the version substituted.
    #[must_use]
    pub fn resolved_url(&self) -> String {
        self.url.replace("{version}", &self.version)
    }
}

/// `[source]`: the repository built per architecture.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSection {
    /// Clone URL.
    pub repository: String,
    /// Exact tag to check out.
    pub tag: String,
}

/// `[build]`: external build tool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Program used to build the source checkout.
    #[serde(default = "default_tool")]
    pub tool: String,
    /// SDK path passed as `--sdk`.
    #[serde(default)]
    pub sdk: Option<Utf8PathBuf>,
    /// Per-command time limit in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Build both architectures concurrently.
    #[serde(default)]
    pub parallel: bool,
    /// Download attempts for the prebuilt archive.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl BuildSection {
    /// The per-command time limit.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            tool: default_tool(),
            sdk: None,
            timeout_secs: default_timeout_secs(),
            parallel: false,
            retries: default_retries(),
        }
    }
}

/// `[platform]`: the target operating system and architectures.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformSection {
    /// Operating system, such as `ios` or `macos`.
    pub os: String,
    /// Minimum OS version used in the target triple and `Info.plist`.
    pub deployment_target: String,
    /// Optional platform variant, such as `simulator`.
    #[serde(default)]
    pub variant: Option<String>,
    /// The two architectures fused into each artefact.
    #[serde(default = "default_architectures")]
    pub architectures: Vec<Architecture>,
}

impl PlatformSection {
    /// The OS component of a target triple (`macosx` for macOS).
    #[must_use]
    pub fn triple_os(&self) -> &str {
        match self.os.as_str() {
            "macos" => "macosx",
            other => other,
        }
    }

    /// Architectures in slice order.
    #[must_use]
    pub fn sorted_architectures(&self) -> Vec<Architecture> {
        let set: BTreeSet<Architecture> = self.architectures.iter().copied().collect();
        set.into_iter().collect()
    }
}

/// `[assembly]`: assembly policies.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssemblySection {
    /// What to do when two header sources share a file name.
    #[serde(default)]
    pub header_collisions: CollisionPolicy,
    /// Command run on each static library to add its symbol table. The
    /// library path is appended. An empty list skips the step and leaves
    /// libraries the linker will refuse.
    #[serde(default = "default_ranlib")]
    pub ranlib: Vec<String>,
}

impl Default for AssemblySection {
    fn default() -> Self {
        Self {
            header_collisions: CollisionPolicy::default(),
            ranlib: default_ranlib(),
        }
    }
}

fn default_ranlib() -> Vec<String> {
    vec!["xcrun".to_owned(), "ranlib".to_owned()]
}

/// One `[[artefacts]]` entry: an xcframework assembled from source.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtefactSpec {
    /// Artefact and framework name.
    pub name: ArtefactName,
    /// Build modules whose objects make up the artefact; defaults to the
    /// artefact name.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Header directories or files, relative to the source checkout.
    #[serde(default)]
    pub headers: Vec<Utf8PathBuf>,
    /// Resource bundle directory name inside the build's release directory.
    #[serde(default)]
    pub resource_bundle: Option<String>,
    /// Skip the artefact with a warning when its objects are missing.
    #[serde(default)]
    pub optional: bool,
    /// Bundle version; defaults to the source tag.
    #[serde(default)]
    pub version: Option<String>,
}

impl ArtefactSpec {
    /// The modules to collect objects from.
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        if self.modules.is_empty() {
            vec![self.name.as_str().to_owned()]
        } else {
            self.modules.clone()
        }
    }
}

/// Version identifiers supplied outside the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionOverrides {
    /// Replaces `prebuilt.version`.
    pub prebuilt_version: Option<String>,
    /// Replaces `source.tag`.
    pub source_tag: Option<String>,
    /// Replaces `release.tag`.
    pub release_tag: Option<String>,
}

impl Config {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Parse and validate configuration text; `origin` labels errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(text: &str, origin: &Utf8Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_owned(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply command-line or environment overrides.
    pub fn apply_overrides(&mut self, overrides: &VersionOverrides) {
        if let (Some(prebuilt), Some(version)) =
            (self.prebuilt.as_mut(), overrides.prebuilt_version.as_ref())
        {
            prebuilt.version.clone_from(version);
        }
        if let (Some(source), Some(tag)) = (self.source.as_mut(), overrides.source_tag.as_ref()) {
            source.tag.clone_from(tag);
        }
        if let Some(tag) = &overrides.release_tag {
            self.release.tag = Some(tag.clone());
        }
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.package.name.trim().is_empty() {
            return Err(invalid("package.name", "must not be empty"));
        }
        for (index, platform) in self.package.platforms.iter().enumerate() {
            if platform.swift_name().is_none() {
                return Err(invalid(
                    &format!("package.platforms[{index}].name"),
                    &format!("unknown platform \"{}\"", platform.name),
                ));
            }
        }
        if swift_platform_name(&self.platform.os).is_none() {
            return Err(invalid(
                "platform.os",
                &format!("unknown platform \"{}\"", self.platform.os),
            ));
        }
        if self.platform.sorted_architectures().len() != 2 || self.platform.architectures.len() != 2
        {
            return Err(invalid(
                "platform.architectures",
                "exactly two distinct architectures are required",
            ));
        }
        if self.release.repository.trim().is_empty() {
            return Err(invalid("release.repository", "must not be empty"));
        }
        if self.build.retries == 0 {
            return Err(invalid("build.retries", "at least one attempt is required"));
        }
        if self.assembly.ranlib.iter().any(|part| part.trim().is_empty()) {
            return Err(invalid("assembly.ranlib", "command parts must not be blank"));
        }
        if !self.artefacts.is_empty() && self.source.is_none() {
            return Err(invalid(
                "artefacts",
                "artefacts are built from source, but [source] is not configured",
            ));
        }
        let mut seen = BTreeSet::new();
        for artefact in &self.artefacts {
            if !seen.insert(artefact.name.as_str()) {
                return Err(invalid(
                    "artefacts.name",
                    &format!("\"{}\" is declared more than once", artefact.name),
                ));
            }
        }
        Ok(())
    }
}

/// Map a platform name to its `Package.swift` spelling.
#[must_use]
pub fn swift_platform_name(name: &str) -> Option<&'static str> {
    match name {
        "ios" => Some("iOS"),
        "macos" => Some("macOS"),
        "maccatalyst" => Some("macCatalyst"),
        "tvos" => Some("tvOS"),
        "watchos" => Some("watchOS"),
        "visionos" => Some("visionOS"),
        _ => None,
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

fn default_tools_version() -> String {
    "5.9".to_owned()
}

fn default_bundle_prefix() -> String {
    "org.xcpack".to_owned()
}

fn default_base_url() -> String {
    "https://github.com/{repository}/releases/download/{tag}".to_owned()
}

fn default_tool() -> String {
    "swift".to_owned()
}

const fn default_timeout_secs() -> u64 {
    3600
}

const fn default_retries() -> u32 {
    3
}

fn default_architectures() -> Vec<Architecture> {
    Architecture::ALL.to_vec()
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

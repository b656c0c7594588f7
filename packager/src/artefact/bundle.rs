//! Framework and xcframework bundle layout.
//!
//! An assembled artefact is written as:
//!
//! ```text
//! <Name>.xcframework/
//!   Info.plist
//!   <os>-arm64_x86_64[-<variant>]/
//!     <Name>.framework/
//!       <Name>                  universal static library
//!       Info.plist
//!       Headers/...
//!       Modules/module.modulemap
//! ```
//!
//! Property lists are rendered as XML text in a fixed key order so the
//! bundle contents are reproducible.

use crate::artefact::headers::FlattenedHeaders;
use crate::artefact::name::ArtefactName;
use crate::error::{PackagerError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use xcpack_fatbin::Architecture;

const PLIST_HEADER: &str = concat!(
    "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
    "<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" ",
    "\"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n",
    "<plist version=\"1.0\">\n",
);
const PLIST_FOOTER: &str = "</plist>\n";

/// The platform slice an xcframework library entry targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibrarySlice {
    /// Platform identifier, such as `ios`.
    pub platform: String,
    /// Optional variant, such as `simulator`.
    pub variant: Option<String>,
    /// Architectures fused into the binary.
    pub architectures: Vec<Architecture>,
}

impl LibrarySlice {
    /// The `LibraryIdentifier`: `<os>-<arch>_<arch>[-<variant>]`, with
    /// architecture names sorted alphabetically.
    ///
    /// # Examples
    ///
    /// ```
    /// use xcpack_fatbin::Architecture;
    /// use xcpack_packager::artefact::bundle::LibrarySlice;
    ///
    /// let slice = LibrarySlice {
    ///     platform: "ios".to_owned(),
    ///     variant: Some("simulator".to_owned()),
    ///     architectures: vec![Architecture::X86_64, Architecture::Arm64],
    /// };
    /// assert_eq!(slice.identifier(), "ios-arm64_x86_64-simulator");
    /// ```
    #[must_use]
    pub fn identifier(&self) -> String {
        let mut id = format!("{}-{}", self.platform, self.architecture_names().join("_"));
        if let Some(variant) = &self.variant {
            id.push('-');
            id.push_str(variant);
        }
        id
    }

    fn architecture_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.architectures.iter().map(|a| a.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Inputs for one framework bundle.
#[derive(Debug)]
pub struct FrameworkSpec<'a> {
    /// Framework name.
    pub name: &'a ArtefactName,
    /// Universal binary written at the bundle root.
    pub binary: &'a [u8],
    /// `CFBundleIdentifier`.
    pub bundle_identifier: String,
    /// `CFBundleShortVersionString` and `CFBundleVersion`.
    pub version: &'a str,
    /// `MinimumOSVersion`.
    pub minimum_os_version: &'a str,
}

/// Create `<parent>/<Name>.framework` with its binary, `Info.plist`, and
/// module map. Headers are expected to be flattened into
/// [`headers_dir`] beforehand; `headers` lists them.
///
/// # Errors
///
/// Returns [`PackagerError::Io`] when a file cannot be written.
pub fn write_framework(
    spec: &FrameworkSpec<'_>,
    headers: &FlattenedHeaders,
    parent: &Path,
) -> Result<PathBuf> {
    let root = framework_dir(parent, spec.name);
    let modules = root.join("Modules");
    fs::create_dir_all(&modules).map_err(PackagerError::io(&modules))?;

    write_file(&root.join(spec.name.as_str()), spec.binary)?;
    write_file(&root.join("Info.plist"), framework_info_plist(spec).as_bytes())?;
    write_file(
        &modules.join("module.modulemap"),
        module_map(spec.name, headers).as_bytes(),
    )?;
    Ok(root)
}

/// Path of the framework bundle under `parent`.
#[must_use]
pub fn framework_dir(parent: &Path, name: &ArtefactName) -> PathBuf {
    parent.join(name.framework_dir_name())
}

/// Path of the flattened headers inside a framework under `parent`.
#[must_use]
pub fn headers_dir(parent: &Path, name: &ArtefactName) -> PathBuf {
    framework_dir(parent, name).join("Headers")
}

/// Write the top-level `Info.plist` of an xcframework.
///
/// # Errors
///
/// Returns [`PackagerError::Io`] when the file cannot be written.
pub fn write_xcframework_info(
    xcframework: &Path,
    name: &ArtefactName,
    slice: &LibrarySlice,
) -> Result<()> {
    fs::create_dir_all(xcframework).map_err(PackagerError::io(xcframework))?;
    write_file(
        &xcframework.join("Info.plist"),
        xcframework_info_plist(name, slice).as_bytes(),
    )
}

/// Render the Clang module map for a framework.
///
/// An umbrella header named after the framework is preferred; otherwise
/// the whole `Headers` directory is the umbrella. A framework without
/// headers gets a module with no umbrella so it can still be imported for
/// linking.
#[must_use]
pub fn module_map(name: &ArtefactName, headers: &FlattenedHeaders) -> String {
    let umbrella_header = format!("{name}.h");
    let umbrella = if headers.contains(&umbrella_header) {
        Some(format!("  umbrella header \"{umbrella_header}\"\n"))
    } else if headers.is_empty() {
        None
    } else {
        Some("  umbrella \"Headers\"\n".to_owned())
    };

    let mut map = format!("framework module {name} {{\n");
    if let Some(line) = umbrella {
        map.push_str(&line);
        map.push_str("  export *\n");
        map.push_str("  module * { export * }\n");
    } else {
        map.push_str("  export *\n");
    }
    map.push_str("}\n");
    map
}

/// Render a framework's `Info.plist`.
#[must_use]
pub fn framework_info_plist(spec: &FrameworkSpec<'_>) -> String {
    let name = spec.name.as_str();
    let entries = [
        ("CFBundleDevelopmentRegion", "en"),
        ("CFBundleExecutable", name),
        ("CFBundleIdentifier", spec.bundle_identifier.as_str()),
        ("CFBundleInfoDictionaryVersion", "6.0"),
        ("CFBundleName", name),
        ("CFBundlePackageType", "FMWK"),
        ("CFBundleShortVersionString", spec.version),
        ("CFBundleVersion", spec.version),
        ("MinimumOSVersion", spec.minimum_os_version),
    ];
    let mut body = String::from("<dict>\n");
    for (key, value) in entries {
        push_string_entry(&mut body, 1, key, value);
    }
    body.push_str("</dict>\n");
    format!("{PLIST_HEADER}{body}{PLIST_FOOTER}")
}

/// Render an xcframework's `Info.plist` with a single library entry.
#[must_use]
pub fn xcframework_info_plist(name: &ArtefactName, slice: &LibrarySlice) -> String {
    let framework = name.framework_dir_name();
    let binary_path = format!("{framework}/{name}");
    let identifier = slice.identifier();

    let mut body = String::from("<dict>\n");
    push_key(&mut body, 1, "AvailableLibraries");
    body.push_str("\t<array>\n");
    body.push_str("\t\t<dict>\n");
    push_string_entry(&mut body, 3, "BinaryPath", &binary_path);
    push_string_entry(&mut body, 3, "LibraryIdentifier", &identifier);
    push_string_entry(&mut body, 3, "LibraryPath", &framework);
    push_key(&mut body, 3, "SupportedArchitectures");
    body.push_str("\t\t\t<array>\n");
    for arch in slice.architecture_names() {
        body.push_str(&format!("\t\t\t\t<string>{arch}</string>\n"));
    }
    body.push_str("\t\t\t</array>\n");
    push_string_entry(&mut body, 3, "SupportedPlatform", &slice.platform);
    if let Some(variant) = &slice.variant {
        push_string_entry(&mut body, 3, "SupportedPlatformVariant", variant);
    }
    body.push_str("\t\t</dict>\n");
    body.push_str("\t</array>\n");
    push_string_entry(&mut body, 1, "CFBundlePackageType", "XFWK");
    push_string_entry(&mut body, 1, "XCFrameworkFormatVersion", "1.0");
    body.push_str("</dict>\n");
    format!("{PLIST_HEADER}{body}{PLIST_FOOTER}")
}

fn push_key(out: &mut String, depth: usize, key: &str) {
    out.push_str(&format!("{}<key>{}</key>\n", "\t".repeat(depth), escape_xml(key)));
}

fn push_string_entry(out: &mut String, depth: usize, key: &str, value: &str) {
    push_key(out, depth, key);
    out.push_str(&format!(
        "{}<string>{}</string>\n",
        "\t".repeat(depth),
        escape_xml(value)
    ));
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    fs::write(path, contents).map_err(PackagerError::io(path))
}

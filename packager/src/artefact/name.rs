//! Validated artefact names and the file names derived from them.
//!
//! An artefact name doubles as a Swift module name, a framework bundle
//! name, and the stem of its distribution zip, so it is restricted to
//! characters that are valid in all three.

use crate::error::PackagerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Extension of a distribution archive.
pub const ZIP_EXTENSION: &str = "zip";

/// A validated artefact name such as `FirebaseCore`.
///
/// # Examples
///
/// ```
/// use xcpack_packager::artefact::name::ArtefactName;
///
/// let name = ArtefactName::try_from("FirebaseCore").expect("valid name");
/// assert_eq!(name.zip_file_name(), "FirebaseCore.zip");
/// assert_eq!(name.xcframework_dir_name(), "FirebaseCore.xcframework");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtefactName(String);

impl ArtefactName {
    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the distribution archive: `<Name>.zip`.
    #[must_use]
    pub fn zip_file_name(&self) -> String {
        format!("{}.{ZIP_EXTENSION}", self.0)
    }

    /// Directory name of the xcframework bundle: `<Name>.xcframework`.
    #[must_use]
    pub fn xcframework_dir_name(&self) -> String {
        format!("{}.xcframework", self.0)
    }

    /// Directory name of the framework bundle: `<Name>.framework`.
    #[must_use]
    pub fn framework_dir_name(&self) -> String {
        format!("{}.framework", self.0)
    }
}

fn validate(name: &str) -> Result<(), &'static str> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("name is empty");
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err("name must start with an ASCII letter or underscore");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("name may only contain ASCII letters, digits and '_'");
    }
    Ok(())
}

impl TryFrom<String> for ArtefactName {
    type Error = PackagerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match validate(&value) {
            Ok(()) => Ok(Self(value)),
            Err(reason) => Err(PackagerError::InvalidName {
                name: value,
                reason,
            }),
        }
    }
}

impl TryFrom<&str> for ArtefactName {
    type Error = PackagerError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_owned())
    }
}

impl From<ArtefactName> for String {
    fn from(value: ArtefactName) -> Self {
        value.0
    }
}

impl AsRef<str> for ArtefactName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ArtefactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

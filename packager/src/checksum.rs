//! The persisted checksum record.
//!
//! `checksums.txt` is the only hand-off between packaging and manifest
//! generation. Each line is `<zip-name> <sha256-hex>`; lines are written
//! sorted by name and blank lines are ignored when reading.

use crate::artefact::name::ArtefactName;
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;
use xcpack_common::{DigestError, Sha256Digest};

/// File name of the checksum record inside the output directory.
pub const CHECKSUM_FILE_NAME: &str = "checksums.txt";

/// Errors arising from reading or writing the checksum record.
#[derive(Debug, Error)]
pub enum ChecksumError {
    /// The same zip name appears twice.
    #[error("duplicate checksum entry for {name}")]
    Duplicate {
        /// The repeated zip name.
        name: String,
    },

    /// A line is not `<name> <digest>`.
    #[error("malformed checksum line {line}: {content:?}")]
    Malformed {
        /// One-based line number.
        line: usize,
        /// The offending line.
        content: String,
    },

    /// A line carries an invalid digest.
    #[error("invalid digest on checksum line {line}: {source}")]
    InvalidDigest {
        /// One-based line number.
        line: usize,
        /// The validation failure.
        #[source]
        source: DigestError,
    },

    /// The record file could not be read or written.
    #[error("checksum record {}: {source}", path.display())]
    Io {
        /// The record path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Mapping from distribution zip name to its SHA-256 digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumRecord {
    entries: BTreeMap<String, Sha256Digest>,
}

impl ChecksumRecord {
    /// An empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Duplicate`] if `name` is already present.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        digest: Sha256Digest,
    ) -> Result<(), ChecksumError> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(ChecksumError::Duplicate { name });
        }
        self.entries.insert(name, digest);
        Ok(())
    }

    /// Digest recorded for a zip file name.
    #[must_use]
    pub fn get(&self, zip_name: &str) -> Option<&Sha256Digest> {
        self.entries.get(zip_name)
    }

    /// Digest recorded for an artefact's `<Name>.zip`.
    #[must_use]
    pub fn get_for_artefact(&self, name: &ArtefactName) -> Option<&Sha256Digest> {
        self.get(&name.zip_file_name())
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Sha256Digest)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the record has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse the text form.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError`] for malformed lines, invalid digests, or
    /// duplicate names.
    pub fn parse(text: &str) -> Result<Self, ChecksumError> {
        let mut record = Self::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut fields = trimmed.split_whitespace();
            let (Some(name), Some(hex), None) = (fields.next(), fields.next(), fields.next()) else {
                return Err(ChecksumError::Malformed {
                    line,
                    content: raw.to_owned(),
                });
            };
            let digest = Sha256Digest::try_from(hex)
                .map_err(|source| ChecksumError::InvalidDigest { line, source })?;
            record.insert(name, digest)?;
        }
        Ok(record)
    }

    /// Render the text form, one sorted `<name> <digest>` line per entry.
    #[must_use]
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(name, digest)| format!("{name} {digest}\n"))
            .collect()
    }

    /// Read a record file.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Io`] when the file cannot be read, or a
    /// parse error.
    pub fn read(path: &Path) -> Result<Self, ChecksumError> {
        let text = std::fs::read_to_string(path).map_err(|source| ChecksumError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Atomically replace the record file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ChecksumError::Io`] when the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<(), ChecksumError> {
        let io_err = |source| ChecksumError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        temp.write_all(self.render().as_bytes()).map_err(io_err)?;
        temp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use xcpack_common::sha256_of_bytes;

    fn sample() -> ChecksumRecord {
        let mut record = ChecksumRecord::new();
        record
            .insert("VendorCore.zip", sha256_of_bytes(b"core"))
            .expect("insert");
        record
            .insert("Alpha.zip", sha256_of_bytes(b"alpha"))
            .expect("insert");
        record
    }

    #[test]
    fn write_then_read_yields_same_mapping() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("dist").join(CHECKSUM_FILE_NAME);
        let record = sample();
        record.write(&path).expect("write");
        assert_eq!(ChecksumRecord::read(&path).expect("read"), record);
    }

    #[test]
    fn render_sorts_by_name() {
        let text = sample().render();
        let names: Vec<&str> = text
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .collect();
        assert_eq!(names, vec!["Alpha.zip", "VendorCore.zip"]);
    }

    #[test]
    fn artefact_lookup_uses_zip_name() {
        let name = ArtefactName::try_from("Alpha").expect("name");
        assert_eq!(
            sample().get_for_artefact(&name),
            Some(&sha256_of_bytes(b"alpha"))
        );
    }

    #[test]
    fn blank_lines_are_ignored() {
        let text = format!("\n{}\n\n", sample().render());
        assert_eq!(ChecksumRecord::parse(&text).expect("parse").len(), 2);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let line = format!("Alpha.zip {}\n", sha256_of_bytes(b"a"));
        let err = ChecksumRecord::parse(&line.repeat(2)).expect_err("duplicate");
        assert!(matches!(err, ChecksumError::Duplicate { name } if name == "Alpha.zip"));
    }

    #[rstest]
    #[case::one_field("Alpha.zip")]
    #[case::three_fields("Alpha.zip abc def")]
    fn malformed_lines_report_line_number(#[case] line: &str) {
        let err = ChecksumRecord::parse(&format!("\n{line}\n")).expect_err("malformed");
        assert!(matches!(err, ChecksumError::Malformed { line: 2, .. }));
    }

    #[test]
    fn invalid_digest_is_rejected() {
        let err = ChecksumRecord::parse("Alpha.zip deadbeef\n").expect_err("short digest");
        assert!(matches!(err, ChecksumError::InvalidDigest { line: 1, .. }));
    }
}

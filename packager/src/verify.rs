//! Output verification.
//!
//! Recomputes the SHA-256 of every zip named in `checksums.txt` and
//! compares it with the recorded value. Zips present in the output
//! directory but absent from the record are reported without failing,
//! since a previous run may have left them behind.

use crate::checksum::{CHECKSUM_FILE_NAME, ChecksumRecord};
use crate::error::{PackagerError, Result};
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::Path;
use xcpack_common::compute_sha256;

/// Outcome of verifying an output directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    /// Zips whose digest matches the record.
    pub verified: Vec<String>,
    /// Zips whose digest differs from the record.
    pub mismatched: Vec<String>,
    /// Recorded zips that are missing from the directory.
    pub missing: Vec<String>,
    /// Zips in the directory that the record does not mention.
    pub unrecorded: Vec<String>,
}

impl VerifyReport {
    /// Number of recorded archives that failed verification.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.mismatched.len() + self.missing.len()
    }

    /// Whether every recorded archive verified.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    /// Turn a failed report into [`PackagerError::VerificationFailed`].
    ///
    /// # Errors
    ///
    /// Returns the error when any recorded archive failed.
    pub fn into_result(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PackagerError::VerificationFailed {
                count: self.failures(),
            })
        }
    }
}

/// Verify the archives in `output_dir` against its checksum record.
///
/// `ignore` lists zip names that are expected but never recorded, such as
/// the combined archive.
///
/// # Errors
///
/// Returns [`PackagerError::Checksum`] when the record cannot be read and
/// [`PackagerError::Io`] when the directory cannot be listed. Mismatches
/// are reported in the returned [`VerifyReport`], not as errors.
pub fn verify_output(output_dir: &Path, ignore: &[String]) -> Result<VerifyReport> {
    let record = ChecksumRecord::read(&output_dir.join(CHECKSUM_FILE_NAME))?;
    let mut report = VerifyReport::default();

    for (zip_name, expected) in record.iter() {
        let path = output_dir.join(zip_name);
        if !path.is_file() {
            warn!("{zip_name}: recorded but missing from {}", output_dir.display());
            report.missing.push(zip_name.to_owned());
            continue;
        }
        let actual = compute_sha256(&path)?;
        if &actual == expected {
            info!("{zip_name}: OK");
            report.verified.push(zip_name.to_owned());
        } else {
            warn!("{zip_name}: checksum mismatch (recorded {expected}, actual {actual})");
            report.mismatched.push(zip_name.to_owned());
        }
    }

    let entries = fs::read_dir(output_dir).map_err(PackagerError::io(output_dir))?;
    for entry in entries {
        let entry = entry.map_err(PackagerError::io(output_dir))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        let is_zip = Path::new(&file_name)
            .extension()
            .is_some_and(|ext| ext == "zip");
        if is_zip && record.get(&file_name).is_none() && !ignore.contains(&file_name) {
            warn!("{file_name}: not listed in {CHECKSUM_FILE_NAME}");
            report.unrecorded.push(file_name);
        }
    }
    report.unrecorded.sort();
    Ok(report)
}

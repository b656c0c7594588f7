//! Binary inspection for the `inspect` subcommand.
//!
//! Reports the slices of a universal binary, or the single implicit slice
//! of a plain static archive, together with the archive members of each
//! slice. Slices that are Mach-O images rather than archives report no
//! members.

use crate::error::{PackagerError, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use xcpack_fatbin::{FatArch, is_archive, is_universal, list_slices, read_members};

/// The kind of file inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BinaryKind {
    /// A Mach-O universal binary.
    Universal,
    /// A single-architecture static archive.
    Archive,
}

/// One member of a static archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberReport {
    /// Member file name.
    pub name: String,
    /// Member size in bytes.
    pub size: usize,
}

/// One architecture slice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SliceReport {
    /// Architecture name, or `cputype <n>` for unsupported slices, or
    /// `unknown` for a plain archive.
    pub architecture: String,
    /// Byte offset of the slice.
    pub offset: u32,
    /// Slice size in bytes.
    pub size: u32,
    /// Alignment as a power of two.
    pub align: u32,
    /// Archive members; empty when the slice is not an archive.
    pub members: Vec<MemberReport>,
}

/// Everything `inspect` reports about a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inspection {
    /// The inspected file.
    pub path: PathBuf,
    /// Universal binary or plain archive.
    pub kind: BinaryKind,
    /// Slices in header order.
    pub slices: Vec<SliceReport>,
}

impl Inspection {
    /// Human-readable report.
    #[must_use]
    pub fn render_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Inspection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BinaryKind::Universal => "universal binary",
            BinaryKind::Archive => "static archive",
        };
        writeln!(
            f,
            "{}: {kind} with {} slice(s)",
            self.path.display(),
            self.slices.len()
        )?;
        for slice in &self.slices {
            writeln!(
                f,
                "  {} offset={} size={} align=2^{}",
                slice.architecture, slice.offset, slice.size, slice.align
            )?;
            for member in &slice.members {
                writeln!(f, "    {} ({} bytes)", member.name, member.size)?;
            }
        }
        Ok(())
    }
}

/// Inspect the file at `path`.
///
/// # Errors
///
/// Returns [`PackagerError::UnrecognisedBinary`] for other file types,
/// [`PackagerError::Malformed`] for corrupt input, and
/// [`PackagerError::Io`] when the file cannot be read.
pub fn inspect_file(path: &Path) -> Result<Inspection> {
    let bytes = std::fs::read(path).map_err(PackagerError::io(path))?;
    inspect_bytes(path, &bytes)
}

/// Inspect in-memory bytes; `path` labels the report and errors.
///
/// # Errors
///
/// See [`inspect_file`].
pub fn inspect_bytes(path: &Path, bytes: &[u8]) -> Result<Inspection> {
    let malformed = |reason: String| PackagerError::Malformed {
        path: path.to_path_buf(),
        reason,
    };

    if is_universal(bytes) {
        let records = list_slices(bytes).map_err(|e| malformed(e.to_string()))?;
        let slices = records
            .iter()
            .map(|record| slice_report(record, bytes).map_err(&malformed))
            .collect::<Result<_>>()?;
        return Ok(Inspection {
            path: path.to_path_buf(),
            kind: BinaryKind::Universal,
            slices,
        });
    }

    if is_archive(bytes) {
        let members = members_of(bytes).map_err(malformed)?;
        let size = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        return Ok(Inspection {
            path: path.to_path_buf(),
            kind: BinaryKind::Archive,
            slices: vec![SliceReport {
                architecture: "unknown".to_owned(),
                offset: 0,
                size,
                align: 0,
                members,
            }],
        });
    }

    Err(PackagerError::UnrecognisedBinary {
        path: path.to_path_buf(),
    })
}

fn slice_report(record: &FatArch, bytes: &[u8]) -> std::result::Result<SliceReport, String> {
    let start = record.offset as usize;
    let body = bytes
        .get(start..start + record.size as usize)
        .ok_or_else(|| format!("slice at offset {start} is out of bounds"))?;
    let members = if is_archive(body) {
        members_of(body)?
    } else {
        Vec::new()
    };
    let architecture = record.architecture().map_or_else(
        || format!("cputype {}", record.cpu_type),
        |arch| arch.as_str().to_owned(),
    );
    Ok(SliceReport {
        architecture,
        offset: record.offset,
        size: record.size,
        align: record.align,
        members,
    })
}

fn members_of(bytes: &[u8]) -> std::result::Result<Vec<MemberReport>, String> {
    let members = read_members(bytes).map_err(|e| e.to_string())?;
    Ok(members
        .into_iter()
        .map(|m| MemberReport {
            size: m.data.len(),
            name: m.name,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xcpack_fatbin::{Architecture, ArchiveBuilder, ThinSlice, fuse};

    fn library(member: &str) -> Vec<u8> {
        let mut builder = ArchiveBuilder::new();
        builder
            .append(member, b"object".to_vec())
            .expect("append");
        builder.finish().expect("finish")
    }

    #[test]
    fn reports_universal_slices_and_members() {
        let x86 = library("Alpha_x86.o");
        let arm = library("Alpha_arm.o");
        let fat = fuse(&[
            ThinSlice {
                architecture: Architecture::Arm64,
                bytes: &arm,
            },
            ThinSlice {
                architecture: Architecture::X86_64,
                bytes: &x86,
            },
        ])
        .expect("fuse");

        let report = inspect_bytes(Path::new("Alpha"), &fat).expect("inspect");
        assert_eq!(report.kind, BinaryKind::Universal);
        let archs: Vec<&str> = report.slices.iter().map(|s| s.architecture.as_str()).collect();
        assert_eq!(archs, vec!["x86_64", "arm64"]);
        assert_eq!(report.slices[1].members[0].name, "Alpha_arm.o");

        let text = report.render_text();
        assert!(text.starts_with("Alpha: universal binary with 2 slice(s)\n"));
        assert!(text.contains("    Alpha_x86.o (6 bytes)\n"));

        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["kind"], "universal");
        assert_eq!(json["slices"][0]["architecture"], "x86_64");
    }

    #[test]
    fn reports_plain_archive_as_one_slice() {
        let report = inspect_bytes(Path::new("libAlpha.a"), &library("a.o")).expect("inspect");
        assert_eq!(report.kind, BinaryKind::Archive);
        assert_eq!(report.slices.len(), 1);
        assert_eq!(report.slices[0].members.len(), 1);
    }

    #[test]
    fn rejects_other_files() {
        let err = inspect_bytes(Path::new("README.md"), b"# readme").expect_err("not binary");
        assert!(matches!(err, PackagerError::UnrecognisedBinary { .. }));
    }
}

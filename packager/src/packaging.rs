//! Distribution packaging.
//!
//! Zips each staged `<Name>.xcframework` into `<out>/<Name>.zip`, writes a
//! combined `<package>-all.zip` holding every bundle, and records the
//! SHA-256 of each per-bundle zip in `<out>/checksums.txt`.
//!
//! Archives are reproducible: entries are added in sorted order with a
//! fixed timestamp and normalised permissions, so identical bundles always
//! zip to identical bytes and therefore identical checksums. Symbolic
//! links are stored as links.

use crate::artefact::name::{ArtefactName, ZIP_EXTENSION};
use crate::checksum::{CHECKSUM_FILE_NAME, ChecksumRecord};
use crate::error::{PackagerError, Result};
use log::{debug, info};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use xcpack_common::{Sha256Digest, compute_sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Suffix of the combined archive's stem.
const COMBINED_SUFFIX: &str = "-all";

/// One packaged bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedBundle {
    /// Bundle name.
    pub name: ArtefactName,
    /// The written `<Name>.zip`.
    pub zip_path: PathBuf,
    /// SHA-256 of the zip.
    pub checksum: Sha256Digest,
}

/// Everything written by [`package_all`].
#[derive(Debug, Clone)]
pub struct PackageReport {
    /// Per-bundle archives in name order.
    pub bundles: Vec<PackagedBundle>,
    /// The combined archive.
    pub combined: PathBuf,
    /// The checksum record file.
    pub checksums_path: PathBuf,
    /// The record written to `checksums_path`.
    pub record: ChecksumRecord,
}

/// File name of the combined archive for `package_name`.
#[must_use]
pub fn combined_zip_name(package_name: &str) -> String {
    format!("{package_name}{COMBINED_SUFFIX}.{ZIP_EXTENSION}")
}

/// Zip every named bundle in `stage_dir` into `output_dir` and write the
/// checksum record.
///
/// # Errors
///
/// Returns [`PackagerError::NothingToPackage`] when `names` is empty, and
/// I/O, zip, or digest errors.
pub fn package_all(
    stage_dir: &Path,
    names: &[ArtefactName],
    output_dir: &Path,
    package_name: &str,
) -> Result<PackageReport> {
    if names.is_empty() {
        return Err(PackagerError::NothingToPackage);
    }
    fs::create_dir_all(output_dir).map_err(PackagerError::io(output_dir))?;
    let checksums_path = output_dir.join(CHECKSUM_FILE_NAME);
    remove_stale_record(&checksums_path)?;

    let mut sorted = names.to_vec();
    sorted.sort();
    sorted.dedup();

    let mut record = ChecksumRecord::new();
    let mut bundles = Vec::with_capacity(sorted.len());
    for name in &sorted {
        let bundle = zip_bundle(stage_dir, name, output_dir)?;
        record.insert(name.zip_file_name(), bundle.checksum.clone())?;
        bundles.push(bundle);
    }

    let combined = output_dir.join(combined_zip_name(package_name));
    let mut writer = create_zip(&combined)?;
    for name in &sorted {
        let dir_name = name.xcframework_dir_name();
        add_tree(&mut writer, &stage_dir.join(&dir_name), &dir_name, &combined)?;
    }
    finish_zip(writer, &combined)?;
    info!("wrote {}", combined.display());

    record.write(&checksums_path)?;
    info!(
        "recorded {} checksum(s) in {}",
        record.len(),
        checksums_path.display()
    );

    Ok(PackageReport {
        bundles,
        combined,
        checksums_path,
        record,
    })
}

/// Drop a record left by an earlier run so that it never sits beside
/// zips it does not describe.
fn remove_stale_record(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("removed previous checksum record {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(PackagerError::io(path)(e)),
    }
}

/// Zip `<stage>/<Name>.xcframework` into `<out>/<Name>.zip`.
///
/// # Errors
///
/// Returns [`PackagerError::Io`] when the bundle is missing or unreadable,
/// and [`PackagerError::Zip`] when the archive cannot be written.
pub fn zip_bundle(
    stage_dir: &Path,
    name: &ArtefactName,
    output_dir: &Path,
) -> Result<PackagedBundle> {
    let dir_name = name.xcframework_dir_name();
    let bundle_dir = stage_dir.join(&dir_name);
    if !bundle_dir.is_dir() {
        return Err(PackagerError::Io {
            path: bundle_dir,
            source: std::io::ErrorKind::NotFound.into(),
        });
    }
    let zip_path = output_dir.join(name.zip_file_name());
    let mut writer = create_zip(&zip_path)?;
    add_tree(&mut writer, &bundle_dir, &dir_name, &zip_path)?;
    finish_zip(writer, &zip_path)?;

    let checksum = compute_sha256(&zip_path)?;
    info!("packaged {} ({checksum})", zip_path.display());
    Ok(PackagedBundle {
        name: name.clone(),
        zip_path,
        checksum,
    })
}

fn create_zip(path: &Path) -> Result<ZipWriter<File>> {
    let file = File::create(path).map_err(PackagerError::io(path))?;
    Ok(ZipWriter::new(file))
}

fn finish_zip(writer: ZipWriter<File>, path: &Path) -> Result<()> {
    let file = writer.finish().map_err(|e| zip_error(path, &e))?;
    file.sync_all().map_err(PackagerError::io(path))
}

fn zip_error(path: &Path, err: &zip::result::ZipError) -> PackagerError {
    PackagerError::Zip {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

fn entry_options(permissions: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(permissions)
}

/// Add `root` to the archive under `prefix/`.
fn add_tree(
    writer: &mut ZipWriter<File>,
    root: &Path,
    prefix: &str,
    zip_path: &Path,
) -> Result<()> {
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|e| PackagerError::Io {
            path: root.to_path_buf(),
            source: e.into(),
        })?;
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let name = archive_name(prefix, rel);
        let file_type = entry.file_type();

        if file_type.is_symlink() {
            let target = fs::read_link(entry.path()).map_err(PackagerError::io(entry.path()))?;
            debug!("zip: link {name} -> {}", target.display());
            writer
                .add_symlink(name, target.to_string_lossy(), entry_options(0o755))
                .map_err(|e| zip_error(zip_path, &e))?;
        } else if file_type.is_dir() {
            writer
                .add_directory(format!("{name}/"), entry_options(0o755))
                .map_err(|e| zip_error(zip_path, &e))?;
        } else {
            let data = fs::read(entry.path()).map_err(PackagerError::io(entry.path()))?;
            writer
                .start_file(name, entry_options(file_permissions(entry.path())))
                .map_err(|e| zip_error(zip_path, &e))?;
            writer.write_all(&data).map_err(PackagerError::io(zip_path))?;
        }
    }
    Ok(())
}

/// `prefix` joined with the `/`-separated components of `rel`.
fn archive_name(prefix: &str, rel: &Path) -> String {
    let mut name = prefix.to_owned();
    for component in rel.components() {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    name
}

#[cfg(unix)]
fn file_permissions(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    let executable = fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0);
    if executable { 0o755 } else { 0o644 }
}

#[cfg(not(unix))]
fn file_permissions(_path: &Path) -> u32 {
    0o644
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    fn name(value: &str) -> ArtefactName {
        ArtefactName::try_from(value).expect("valid name")
    }

    #[fixture]
    fn staged() -> TempDir {
        let dir = tempfile::tempdir().expect("temp dir");
        for bundle in ["Alpha", "VendorCore"] {
            let framework = dir.path().join(format!(
                "stage/{bundle}.xcframework/ios-arm64_x86_64-simulator/{bundle}.framework"
            ));
            fs::create_dir_all(framework.join("Headers")).expect("mkdir");
            fs::write(framework.join(bundle), format!("{bundle} binary")).expect("binary");
            fs::write(framework.join("Headers/Common.h"), "int x;\n").expect("header");
        }
        dir
    }

    #[rstest]
    fn zipping_is_reproducible(staged: TempDir) {
        let stage = staged.path().join("stage");
        fs::create_dir_all(staged.path().join("a")).expect("mkdir");
        fs::create_dir_all(staged.path().join("b")).expect("mkdir");
        let a = zip_bundle(&stage, &name("Alpha"), &staged.path().join("a")).expect("zip a");
        let b = zip_bundle(&stage, &name("Alpha"), &staged.path().join("b")).expect("zip b");
        assert_eq!(a.checksum, b.checksum);
        assert_eq!(
            fs::read(&a.zip_path).expect("read a"),
            fs::read(&b.zip_path).expect("read b")
        );
    }

    #[rstest]
    fn package_all_writes_bundles_combined_and_record(staged: TempDir) {
        let out = staged.path().join("dist");
        let report = package_all(
            &staged.path().join("stage"),
            &[name("VendorCore"), name("Alpha")],
            &out,
            "Vendor",
        )
        .expect("package");

        let names: Vec<&str> = report.bundles.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "VendorCore"]);
        assert_eq!(report.combined, out.join("Vendor-all.zip"));
        assert!(report.combined.is_file());

        let record = ChecksumRecord::read(&out.join(CHECKSUM_FILE_NAME)).expect("record");
        assert_eq!(record, report.record);
        assert_eq!(record.len(), 2);
        assert!(record.get("Vendor-all.zip").is_none());
        assert_eq!(
            record.get("Alpha.zip"),
            Some(&compute_sha256(&out.join("Alpha.zip")).expect("hash"))
        );

        let combined = zip::ZipArchive::new(File::open(&report.combined).expect("open"))
            .expect("combined zip");
        let entries: Vec<&str> = combined.file_names().collect();
        assert!(entries.iter().any(|e| e.starts_with("Alpha.xcframework/")));
        assert!(entries.iter().any(|e| e.starts_with("VendorCore.xcframework/")));
    }

    #[rstest]
    fn failed_packaging_leaves_no_checksum_record(staged: TempDir) {
        let out = staged.path().join("dist");
        fs::create_dir_all(&out).expect("mkdir dist");
        let stale = out.join(CHECKSUM_FILE_NAME);
        fs::write(&stale, format!("Alpha.zip {}\n", "0".repeat(64))).expect("stale record");

        package_all(
            &staged.path().join("stage"),
            &[name("Alpha"), name("Missing")],
            &out,
            "Vendor",
        )
        .expect_err("Missing is not staged");

        assert!(out.join("Alpha.zip").is_file());
        assert!(!stale.exists());
    }

    #[test]
    fn nothing_to_package_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = package_all(dir.path(), &[], &dir.path().join("dist"), "Vendor")
            .expect_err("empty");
        assert!(matches!(err, PackagerError::NothingToPackage));
    }

    #[test]
    fn combined_archive_name_cannot_collide_with_a_bundle() {
        let combined = combined_zip_name("Vendor");
        let stem = combined.trim_end_matches(".zip");
        assert!(ArtefactName::try_from(stem).is_err());
    }

    #[cfg(unix)]
    #[rstest]
    fn symbolic_links_survive_a_round_trip(staged: TempDir) {
        use crate::fetch::extraction::extract_zip;

        let framework = staged
            .path()
            .join("stage/Alpha.xcframework/ios-arm64_x86_64-simulator/Alpha.framework");
        std::os::unix::fs::symlink("Headers", framework.join("PublicHeaders")).expect("symlink");

        let out = staged.path().join("dist");
        fs::create_dir_all(&out).expect("mkdir");
        let bundle = zip_bundle(&staged.path().join("stage"), &name("Alpha"), &out).expect("zip");

        let extracted = staged.path().join("extracted");
        extract_zip(&bundle.zip_path, &extracted).expect("extract");
        let link = extracted.join(
            "Alpha.xcframework/ios-arm64_x86_64-simulator/Alpha.framework/PublicHeaders",
        );
        assert_eq!(fs::read_link(&link).expect("link"), Path::new("Headers"));
        assert!(link.join("Common.h").is_file());
    }
}

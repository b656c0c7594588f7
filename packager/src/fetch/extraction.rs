//! Zip extraction for prebuilt vendor archives.
//!
//! Extracts a `.zip` archive to a target directory with path traversal
//! protection to prevent zip-slip attacks. Symbolic links, which
//! xcframeworks for macOS rely on, are recreated rather than written as
//! regular files.

use log::warn;
use std::fs;
use std::collections::{BTreeMap, VecDeque};
use std::ffi::OsString;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

/// File type bits of a Unix mode.
const S_IFMT: u32 = 0o170_000;
/// Symbolic link file type.
const S_IFLNK: u32 = 0o120_000;
/// Links followed while resolving one target before giving up.
const MAX_LINK_HOPS: usize = 40;

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The archive is not a readable zip file.
    #[error("invalid zip archive {}: {reason}", path.display())]
    InvalidArchive {
        /// The archive path.
        path: PathBuf,
        /// The zip reader's description.
        reason: String,
    },

    /// A path in the archive attempts to traverse outside the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending path from the archive entry.
        path: String,
    },

    /// The archive contains no entries.
    #[error("archive contains no files")]
    EmptyArchive,
}

/// Extract the zip at `archive_path` into `dest_dir`.
///
/// Regular entries are written first and symbolic links last. Every link
/// target is resolved through the archive's other links and must stay
/// inside `dest_dir`. No entry may be written beneath a link.
///
/// Returns the relative paths of extracted files and links.
///
/// # Errors
///
/// Returns [`ExtractionError::PathTraversal`] if any entry or link target
/// escapes the destination, [`ExtractionError::EmptyArchive`] if nothing
/// was extracted, and [`ExtractionError::InvalidArchive`] or
/// [`ExtractionError::Io`] on read failures.
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let invalid = |e: zip::result::ZipError| ExtractionError::InvalidArchive {
        path: archive_path.to_path_buf(),
        reason: e.to_string(),
    };
    let file = fs::File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(invalid)?;

    let mut links = BTreeMap::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(invalid)?;
        let entry_path = PathBuf::from(entry.name());
        validate_entry_path(&entry_path)?;
        if is_symlink(entry.unix_mode()) {
            let mut target = String::new();
            entry.read_to_string(&mut target)?;
            links.insert(normalise(&entry_path), PathBuf::from(target));
        }
    }
    for (link, target) in &links {
        resolve_link_target(&links, link, target)?;
    }

    fs::create_dir_all(dest_dir)?;
    let mut extracted = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(invalid)?;
        let mode = entry.unix_mode();
        if is_symlink(mode) {
            continue;
        }
        let entry_path = PathBuf::from(entry.name());
        ensure_not_beneath_link(&links, dest_dir, &entry_path)?;
        let dest_path = dest_dir.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&dest_path)?;
            continue;
        }
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&dest_path)?;
        std::io::copy(&mut entry, &mut out)?;
        set_permissions(&dest_path, mode)?;
        extracted.push(entry_path);
    }

    for (link, target) in &links {
        ensure_not_beneath_link(&links, dest_dir, link)?;
        let dest_path = dest_dir.join(link);
        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent)?;
        }
        create_symlink(target, &dest_path)?;
        extracted.push(link.clone());
    }

    if extracted.is_empty() {
        return Err(ExtractionError::EmptyArchive);
    }
    Ok(extracted)
}

fn is_symlink(mode: Option<u32>) -> bool {
    mode.is_some_and(|m| m & S_IFMT == S_IFLNK)
}

/// Keep only the normal components of an archive path.
fn normalise(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

/// Validate that an entry path does not escape the destination directory
/// via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Refuse `entry` when one of its ancestors is a link, either declared in
/// the archive or already present on disk.
fn ensure_not_beneath_link(
    links: &BTreeMap<PathBuf, PathBuf>,
    dest_dir: &Path,
    entry: &Path,
) -> Result<(), ExtractionError> {
    let entry = normalise(entry);
    let mut ancestor = PathBuf::new();
    let mut components = entry.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        ancestor.push(component);
        let on_disk = fs::symlink_metadata(dest_dir.join(&ancestor))
            .is_ok_and(|meta| meta.file_type().is_symlink());
        if on_disk || links.contains_key(&ancestor) {
            return Err(ExtractionError::PathTraversal {
                path: format!("{} (beneath link {})", entry.display(), ancestor.display()),
            });
        }
    }
    Ok(())
}

/// Resolve `target` from the directory holding `link`, following any
/// other link in the archive, and require the result to stay inside the
/// destination.
fn resolve_link_target(
    links: &BTreeMap<PathBuf, PathBuf>,
    link: &Path,
    target: &Path,
) -> Result<(), ExtractionError> {
    let traversal = || ExtractionError::PathTraversal {
        path: format!("{} -> {}", link.display(), target.display()),
    };
    let mut resolved: Vec<OsString> = link
        .parent()
        .map(|p| p.iter().map(OsString::from).collect())
        .unwrap_or_default();
    let mut pending: VecDeque<Component<'_>> = target.components().collect();
    let mut hops = 0;

    while let Some(component) = pending.pop_front() {
        match component {
            Component::Normal(name) => {
                resolved.push(name.to_os_string());
                let current: PathBuf = resolved.iter().collect();
                if let Some(next) = links.get(&current) {
                    hops += 1;
                    if hops > MAX_LINK_HOPS {
                        return Err(traversal());
                    }
                    resolved.pop();
                    for c in next.components().rev() {
                        pending.push_front(c);
                    }
                }
            }
            Component::ParentDir => {
                resolved.pop().ok_or_else(traversal)?;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return Err(traversal()),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> Result<(), ExtractionError> {
    if link.symlink_metadata().is_ok() {
        fs::remove_file(link)?;
    }
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_symlink(target: &Path, link: &Path) -> Result<(), ExtractionError> {
    warn!(
        "cannot recreate symbolic link {} -> {} on this platform",
        link.display(),
        target.display()
    );
    Ok(())
}

#[cfg(unix)]
fn set_permissions(path: &Path, mode: Option<u32>) -> Result<(), ExtractionError> {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        let perms = fs::Permissions::from_mode(mode & 0o777);
        if let Err(e) = fs::set_permissions(path, perms) {
            warn!("could not set permissions on {}: {e}", path.display());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_permissions(_path: &Path, _mode: Option<u32>) -> Result<(), ExtractionError> {
    Ok(())
}

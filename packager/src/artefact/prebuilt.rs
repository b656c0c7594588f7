//! Prebuilt xcframework discovery.
//!
//! Vendor archives ship ready-made `*.xcframework` bundles, usually nested
//! in per-product directories. Discovery walks the extracted archive,
//! keeps the bundles named in `prebuilt.include` (or all of them), and
//! moves each into the staging directory next to the bundles assembled
//! from source.

use crate::artefact::name::ArtefactName;
use crate::error::{PackagerError, Result};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const XCFRAMEWORK_EXTENSION: &str = "xcframework";

/// A prebuilt bundle found in the extracted archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebuiltBundle {
    /// Bundle name without extension.
    pub name: ArtefactName,
    /// Location of the `<Name>.xcframework` directory.
    pub path: PathBuf,
}

/// Find xcframework bundles under `root`.
///
/// The walk is sorted, and the first bundle found for a name wins; later
/// duplicates are logged. Directories inside a bundle are not searched.
///
/// # Errors
///
/// Returns [`PackagerError::PrebuiltNotFound`] when an included name is
/// absent, and [`PackagerError::Io`] when the tree cannot be read.
pub fn discover_prebuilt(root: &Path, include: &[ArtefactName]) -> Result<Vec<PrebuiltBundle>> {
    let mut found: BTreeMap<ArtefactName, PathBuf> = BTreeMap::new();
    let mut walker = WalkDir::new(root).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let entry = entry.map_err(|e| PackagerError::Io {
            path: root.to_path_buf(),
            source: e.into(),
        })?;
        let path = entry.path();
        if !entry.file_type().is_dir()
            || path.extension().is_none_or(|ext| ext != XCFRAMEWORK_EXTENSION)
        {
            continue;
        }
        walker.skip_current_dir();

        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let name = match ArtefactName::try_from(stem) {
            Ok(name) => name,
            Err(err) => {
                warn!("ignoring prebuilt bundle {}: {err}", path.display());
                continue;
            }
        };
        if let Some(existing) = found.get(&name) {
            warn!(
                "duplicate prebuilt bundle {}; keeping {}",
                path.display(),
                existing.display()
            );
            continue;
        }
        found.insert(name, path.to_path_buf());
    }

    if !include.is_empty() {
        if let Some(missing) = include.iter().find(|n| !found.contains_key(*n)) {
            return Err(PackagerError::PrebuiltNotFound {
                name: missing.to_string(),
            });
        }
        found.retain(|name, _| include.contains(name));
    }

    debug!("found {} prebuilt bundle(s) under {}", found.len(), root.display());
    Ok(found
        .into_iter()
        .map(|(name, path)| PrebuiltBundle { name, path })
        .collect())
}

/// Move discovered bundles into `stage_dir`, returning their names.
///
/// # Errors
///
/// Returns [`PackagerError::Io`] when a bundle cannot be moved.
pub fn stage_prebuilt(bundles: Vec<PrebuiltBundle>, stage_dir: &Path) -> Result<Vec<ArtefactName>> {
    fs::create_dir_all(stage_dir).map_err(PackagerError::io(stage_dir))?;
    let mut staged = Vec::with_capacity(bundles.len());
    for bundle in bundles {
        let dest = stage_dir.join(bundle.name.xcframework_dir_name());
        if dest.exists() {
            fs::remove_dir_all(&dest).map_err(PackagerError::io(&dest))?;
        }
        fs::rename(&bundle.path, &dest).map_err(PackagerError::io(&bundle.path))?;
        info!("staged prebuilt {}", bundle.name);
        staged.push(bundle.name);
    }
    Ok(staged)
}

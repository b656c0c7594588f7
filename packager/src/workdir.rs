//! Exclusive ownership of the working directory.
//!
//! A run holds an advisory lock on `<workdir>.lock` for its whole
//! lifetime and wipes the working directory after acquiring it, so every
//! run starts from a clean slate and a second concurrent run fails fast
//! instead of corrupting the first.

use crate::error::{PackagerError, Result};
use fs2::FileExt;
use log::{debug, warn};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

/// Source checkout directory inside the working directory.
pub const SOURCE_DIR: &str = "source";
/// Scratch root for the per-architecture builds.
pub const BUILD_DIR: &str = "build";

/// A locked, freshly wiped working directory.
#[derive(Debug)]
pub struct WorkDir {
    root: PathBuf,
    lock_path: PathBuf,
    lock: File,
}

impl WorkDir {
    /// Lock and wipe `root`.
    ///
    /// # Errors
    ///
    /// Returns [`PackagerError::WorkDirLocked`] when another run holds the
    /// lock, and [`PackagerError::Io`] when the directory cannot be reset.
    pub fn acquire(root: &Path) -> Result<Self> {
        if let Some(parent) = root.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(PackagerError::io(parent))?;
        }
        let lock_path = lock_path_for(root);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(PackagerError::io(&lock_path))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(PackagerError::WorkDirLocked {
                path: root.to_path_buf(),
                lock: lock_path,
            });
        }
        debug!("locked {}", lock_path.display());

        if root.exists() {
            fs::remove_dir_all(root).map_err(PackagerError::io(root))?;
        }
        fs::create_dir_all(root).map_err(PackagerError::io(root))?;

        Ok(Self {
            root: root.to_path_buf(),
            lock_path,
            lock,
        })
    }

    /// The working directory itself.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// The advisory lock file.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Where the vendor archive is downloaded.
    #[must_use]
    pub fn prebuilt_archive(&self) -> PathBuf {
        self.root.join("prebuilt.zip")
    }

    /// Where the vendor archive is extracted.
    #[must_use]
    pub fn prebuilt_dir(&self) -> PathBuf {
        self.root.join("prebuilt")
    }

    /// The source checkout.
    #[must_use]
    pub fn source_dir(&self) -> PathBuf {
        self.root.join(SOURCE_DIR)
    }

    /// Parent of the per-architecture scratch directories.
    #[must_use]
    pub fn build_dir(&self) -> PathBuf {
        self.root.join(BUILD_DIR)
    }

    /// Where finished `<Name>.xcframework` bundles are collected.
    #[must_use]
    pub fn stage_dir(&self) -> PathBuf {
        self.root.join("stage")
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.lock) {
            warn!("could not release {}: {e}", self.lock_path.display());
        }
    }
}

fn lock_path_for(root: &Path) -> PathBuf {
    let mut name = OsString::from(root.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

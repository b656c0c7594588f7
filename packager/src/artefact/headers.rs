//! Public header flattening.
//!
//! Frameworks expose a single flat `Headers/` directory, while upstream
//! sources spread public headers across several directories. Flattening
//! copies every `*.h` file from the configured sources into one
//! directory. Two different headers with the same file name are a
//! collision, handled according to [`CollisionPolicy`].

use crate::error::{PackagerError, Result};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What to do when two header sources provide the same file name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Abort assembly, naming both sources.
    #[default]
    Fail,
    /// Keep the last header copied and log a warning.
    Overwrite,
}

/// Headers copied into a flattened directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlattenedHeaders {
    /// Copied file names, sorted.
    pub files: Vec<String>,
}

impl FlattenedHeaders {
    /// Whether no header was copied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Whether a header with exactly this file name was copied.
    #[must_use]
    pub fn contains(&self, file_name: &str) -> bool {
        self.files.iter().any(|f| f == file_name)
    }
}

/// Copy every header under `sources` into `dest`.
///
/// A source may be a directory (searched recursively) or a single header
/// file. Missing sources are logged and skipped. Byte-identical
/// duplicates are not treated as collisions.
///
/// # Errors
///
/// Returns [`PackagerError::HeaderCollision`] under
/// [`CollisionPolicy::Fail`], or [`PackagerError::Io`] when copying fails.
pub fn flatten_headers(
    sources: &[PathBuf],
    dest: &Path,
    policy: CollisionPolicy,
) -> Result<FlattenedHeaders> {
    let mut chosen: BTreeMap<String, PathBuf> = BTreeMap::new();

    for source in sources {
        if !source.exists() {
            warn!("header source {} does not exist; skipping", source.display());
            continue;
        }
        for header in collect_headers(source)? {
            let Some(file_name) = header.file_name().map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };
            match chosen.get(&file_name) {
                Some(existing) if same_contents(existing, &header)? => {
                    debug!(
                        "{} duplicates {}; keeping the first",
                        header.display(),
                        existing.display()
                    );
                }
                Some(existing) => match policy {
                    CollisionPolicy::Fail => {
                        return Err(PackagerError::HeaderCollision {
                            file_name,
                            first: existing.clone(),
                            second: header,
                        });
                    }
                    CollisionPolicy::Overwrite => {
                        warn!(
                            "header {file_name}: {} overwrites {}",
                            header.display(),
                            existing.display()
                        );
                        chosen.insert(file_name, header);
                    }
                },
                None => {
                    chosen.insert(file_name, header);
                }
            }
        }
    }

    if chosen.is_empty() {
        return Ok(FlattenedHeaders::default());
    }

    fs::create_dir_all(dest).map_err(PackagerError::io(dest))?;
    for (file_name, source) in &chosen {
        let target = dest.join(file_name);
        fs::copy(source, &target).map_err(PackagerError::io(source))?;
    }
    Ok(FlattenedHeaders {
        files: chosen.into_keys().collect(),
    })
}

/// List header files under `source` in a stable order.
fn collect_headers(source: &Path) -> Result<Vec<PathBuf>> {
    if source.is_file() {
        return Ok(is_header(source)
            .then(|| source.to_path_buf())
            .into_iter()
            .collect());
    }
    let mut headers = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(source).to_path_buf();
            PackagerError::Io {
                path,
                source: e.into(),
            }
        })?;
        if entry.file_type().is_file() && is_header(entry.path()) {
            headers.push(entry.into_path());
        }
    }
    Ok(headers)
}

fn is_header(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "h")
}

fn same_contents(a: &Path, b: &Path) -> Result<bool> {
    let left = fs::read(a).map_err(PackagerError::io(a))?;
    let right = fs::read(b).map_err(PackagerError::io(b))?;
    Ok(left == right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Sources {
        dir: TempDir,
    }

    impl Sources {
        fn write(&self, rel: &str, body: &str) -> PathBuf {
            let path = self.dir.path().join(rel);
            fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
            fs::write(&path, body).expect("write header");
            path
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }
    }

    #[fixture]
    fn sources() -> Sources {
        let sources = Sources {
            dir: tempfile::tempdir().expect("temp dir"),
        };
        sources.write("Alpha/Public/Alpha.h", "#import \"AlphaTypes.h\"\n");
        sources.write("Alpha/Public/Nested/AlphaTypes.h", "typedef int AlphaInt;\n");
        sources.write("Alpha/Public/README.md", "not a header\n");
        sources.write("Beta/Public/Common.h", "// beta\n");
        sources.write("Gamma/Public/Common.h", "// gamma\n");
        sources
    }

    #[rstest]
    fn nested_headers_are_flattened(sources: Sources) {
        let dest = sources.path("out/Headers");
        let flat = flatten_headers(&[sources.path("Alpha/Public")], &dest, CollisionPolicy::Fail)
            .expect("flatten");
        assert_eq!(flat.files, vec!["Alpha.h", "AlphaTypes.h"]);
        assert!(dest.join("AlphaTypes.h").is_file());
        assert!(!dest.join("README.md").exists());
    }

    #[rstest]
    fn collision_fails_by_default(sources: Sources) {
        let err = flatten_headers(
            &[sources.path("Beta/Public"), sources.path("Gamma/Public")],
            &sources.path("out"),
            CollisionPolicy::Fail,
        )
        .expect_err("collision");
        match err {
            PackagerError::HeaderCollision {
                file_name,
                first,
                second,
            } => {
                assert_eq!(file_name, "Common.h");
                assert!(first.starts_with(sources.path("Beta")));
                assert!(second.starts_with(sources.path("Gamma")));
            }
            other => panic!("expected HeaderCollision, got {other:?}"),
        }
    }

    #[rstest]
    fn overwrite_keeps_the_last_header(sources: Sources) {
        let dest = sources.path("out");
        let flat = flatten_headers(
            &[sources.path("Beta/Public"), sources.path("Gamma/Public")],
            &dest,
            CollisionPolicy::Overwrite,
        )
        .expect("flatten");
        assert_eq!(flat.files, vec!["Common.h"]);
        assert_eq!(
            fs::read_to_string(dest.join("Common.h")).expect("read"),
            "// gamma\n"
        );
    }

    #[rstest]
    fn identical_duplicates_are_not_collisions(sources: Sources) {
        sources.write("Delta/Common.h", "// beta\n");
        let flat = flatten_headers(
            &[sources.path("Beta/Public"), sources.path("Delta")],
            &sources.path("out"),
            CollisionPolicy::Fail,
        )
        .expect("identical copies are fine");
        assert!(flat.contains("Common.h"));
    }

    #[rstest]
    fn missing_source_is_skipped(sources: Sources) {
        let dest = sources.path("out");
        let flat = flatten_headers(&[sources.path("Missing")], &dest, CollisionPolicy::Fail)
            .expect("missing headers are not fatal");
        assert!(flat.is_empty());
        assert!(!dest.exists());
    }

    #[rstest]
    fn single_file_source_is_accepted(sources: Sources) {
        let flat = flatten_headers(
            &[sources.path("Alpha/Public/Alpha.h")],
            &sources.path("out"),
            CollisionPolicy::Fail,
        )
        .expect("flatten");
        assert_eq!(flat.files, vec!["Alpha.h"]);
    }
}

//! Exact-tag source checkout.

use crate::error::{PackagerError, Result};
use log::{info, warn};
use std::path::Path;
use std::time::Duration;
use xcpack_common::{CommandExecutor, CommandSpec, run_checked};

/// Build the `git clone` invocation for `repository` at `tag`.
#[must_use]
pub fn clone_command(repository: &str, tag: &str, dest: &Path, timeout: Duration) -> CommandSpec {
    CommandSpec::new("git")
        .args(["clone", "--depth", "1", "--branch", tag, repository])
        .arg(dest.to_string_lossy())
        .env("GIT_TERMINAL_PROMPT", "0")
        .timeout(timeout)
}

/// Shallow-clone `repository` at exactly `tag` into `dest`.
///
/// A failed clone removes whatever git left behind in `dest`.
///
/// # Errors
///
/// Returns [`PackagerError::SourceCheckout`] when git fails, including
/// when the tag does not exist.
pub fn clone_source(
    executor: &dyn CommandExecutor,
    repository: &str,
    tag: &str,
    dest: &Path,
    timeout: Duration,
) -> Result<()> {
    let spec = clone_command(repository, tag, dest, timeout);
    info!("checking out {repository} at {tag}");
    run_checked(executor, &spec).map_err(|source| {
        if dest.exists() {
            if let Err(e) = std::fs::remove_dir_all(dest) {
                warn!("could not remove partial checkout {}: {e}", dest.display());
            }
        }
        PackagerError::SourceCheckout {
            repository: repository.to_owned(),
            tag: tag.to_owned(),
            source: Box::new(source),
        }
    })?;
    Ok(())
}

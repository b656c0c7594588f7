//! Prebuilt archive download with bounded retries.
//!
//! Provides a trait-based abstraction over HTTP so that the retry policy
//! can be tested without network access. Connection failures and 5xx
//! responses are retried with linear back-off; 4xx responses fail
//! immediately. A failed download never leaves a partial file behind.

use log::{info, warn};
use std::path::Path;
use std::time::Duration;

/// Network timeout for a single download attempt.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Delay unit between attempts; attempt `n` waits `n` units.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Trait for downloading a URL to a file.
///
/// # Examples
///
/// ```
/// use xcpack_packager::fetch::download::HttpDownloader;
///
/// let downloader = HttpDownloader::default();
/// // Use downloader.download(url, dest) in production
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait ArtefactDownloader {
    /// Download `url` into `dest`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the file cannot be written.
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

/// Errors arising from downloads.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The request failed in a way that may succeed on retry.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The artefact was not found (HTTP 404).
    #[error("artefact not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The server rejected the request with another 4xx status.
    #[error("request for {url} was rejected with HTTP {status}")]
    Rejected {
        /// The URL that was requested.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Every attempt failed.
    #[error("download of {url} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        /// The URL that was requested.
        url: String,
        /// Number of attempts made.
        attempts: u32,
        /// The final failure.
        last: String,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Whether another attempt might succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::HttpError { .. } | Self::Io(_))
    }
}

/// Bounded retry policy with linear back-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Delay unit between attempts.
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A policy making `attempts` attempts with the default back-off.
    #[must_use]
    pub const fn new(attempts: u32) -> Self {
        Self {
            attempts,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Delay before retry number `retry` (1-based).
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.backoff.saturating_mul(retry)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Download `url` to `dest`, retrying transient failures.
///
/// # Errors
///
/// Returns non-transient errors immediately and
/// [`DownloadError::Exhausted`] once every attempt has failed.
pub fn fetch_with_retry(
    downloader: &dyn ArtefactDownloader,
    url: &str,
    dest: &Path,
    policy: &RetryPolicy,
) -> Result<(), DownloadError> {
    let attempts = policy.attempts.max(1);
    let mut last = String::new();
    for attempt in 1..=attempts {
        info!("downloading {url} (attempt {attempt}/{attempts})");
        match downloader.download(url, dest) {
            Ok(()) => return Ok(()),
            Err(err) => {
                remove_partial(dest);
                if !err.is_transient() {
                    return Err(err);
                }
                warn!("attempt {attempt}/{attempts} for {url} failed: {err}");
                last = err.to_string();
                if attempt < attempts {
                    std::thread::sleep(policy.delay(attempt));
                }
            }
        }
    }
    Err(DownloadError::Exhausted {
        url: url.to_owned(),
        attempts,
        last,
    })
}

fn remove_partial(dest: &Path) {
    match std::fs::remove_file(dest) {
        Ok(()) => warn!("removed partial download {}", dest.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("could not remove partial download {}: {e}", dest.display()),
    }
}

/// HTTP-based downloader using `ureq`.
#[derive(Clone)]
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl Default for HttpDownloader {
    fn default() -> Self {
        Self::with_timeout(DOWNLOAD_TIMEOUT)
    }
}

impl HttpDownloader {
    /// A downloader whose requests time out after `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl ArtefactDownloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(dest)?;
        std::io::copy(&mut response.into_body().as_reader(), &mut file).map_err(|e| {
            DownloadError::HttpError {
                url: url.to_owned(),
                reason: e.to_string(),
            }
        })?;
        file.sync_all()?;
        Ok(())
    }
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        ureq::Error::StatusCode(status) if (400..500).contains(status) => {
            DownloadError::Rejected {
                url: url.to_owned(),
                status: *status,
            }
        }
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}

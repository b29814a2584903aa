//! Atomic download pipeline on top of the access loop.
//!
//! The [`Downloader`] couples a protocol [`Fetcher`] with an
//! [`AccessController`]. Every public operation ([`Downloader::download`],
//! [`Downloader::fetch_bytes`], [`Downloader::check`]) runs through the same
//! controller, so all of them get session reuse, authentication and the
//! denial decision table.
//!
//! A file download is staged in a temporary sibling of the final path and
//! published with a single rename only after the size check (and, when the
//! authenticator can recognise failure pages, the body scan) has passed. The
//! final path therefore either does not exist, keeps its old content, or holds
//! the complete new content.
//!
//! # Example
//!
//! ```no_run
//! use authdl_core::download::Downloader;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::http();
//! let path = downloader
//!     .download("https://example.com/data.bin", Some(Path::new("./downloads")), false)
//!     .await?;
//! println!("Downloaded: {}", path.display());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, instrument};

use super::DownloadError;
use super::access::{AccessController, Operation};
use super::client::HttpFetcher;
use super::constants::AUTH_FAILURE_SCAN_LIMIT;
use super::fetcher::{DownloadDetails, Fetcher, UrlInfo};
use super::filename::resolve_final_path;
use super::progress::{ProgressFactory, SilentProgress};
use super::temp::TempDownload;
use crate::auth::{AuthFailureDetector, Authenticator, Credential};
use crate::session::{Session, SessionProvider, SessionStore};
use crate::ui::Prompter;

/// Target label used in errors for in-memory fetches.
const MEMORY_TARGET: &str = "memory";

/// Downloads remote resources through the authenticated-access loop.
#[derive(Debug, Clone)]
pub struct Downloader {
    fetcher: Arc<dyn Fetcher>,
    controller: AccessController,
    progress: Arc<dyn ProgressFactory>,
    base_dir: Option<PathBuf>,
}

impl Downloader {
    /// Creates a downloader with no authenticator, no prompts and no progress output.
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetcher>, sessions: Arc<dyn SessionProvider>) -> Self {
        Self {
            fetcher,
            controller: AccessController::new(sessions),
            progress: Arc::new(SilentProgress),
            base_dir: None,
        }
    }

    /// HTTP downloader with a default session store.
    #[must_use]
    pub fn http() -> Self {
        Self::new(Arc::new(HttpFetcher::new()), Arc::new(SessionStore::new()))
    }

    /// Attaches the authenticator for the source and the credential it uses.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::MissingCredential`] when the authenticator
    /// requires authentication but `credential` is `None`.
    pub fn with_authenticator(
        mut self,
        authenticator: Arc<dyn Authenticator>,
        credential: Option<Arc<dyn Credential>>,
    ) -> Result<Self, DownloadError> {
        self.controller = self
            .controller
            .with_authenticator(authenticator, credential)?;
        Ok(self)
    }

    /// Replaces the prompter used when credentials are rejected.
    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.controller = self.controller.with_prompter(prompter);
        self
    }

    /// Replaces the progress reporting.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressFactory>) -> Self {
        self.progress = progress;
        self
    }

    /// Directory downloads without a destination land in (default: current directory).
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(base_dir.into());
        self
    }

    /// The access controller, for running custom [`Operation`]s.
    #[must_use]
    pub fn controller(&self) -> &AccessController {
        &self.controller
    }

    /// Downloads `url` and returns the path it was published at.
    ///
    /// `destination` may be an existing directory (the suggested filename is
    /// appended), a file path, or `None` (suggested filename under the base
    /// directory). A download into a destination another download is still
    /// writing waits for it; the last one to finish wins.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::AlreadyExists`] if the final path exists and
    ///   `overwrite` is false; for an explicit file destination this is
    ///   checked before anything is fetched
    /// - [`DownloadError::Integrity`] on a size mismatch
    /// - [`DownloadError::AuthFailureDetected`] if the body is a failure page
    /// - one of the authentication errors from the access loop
    /// - [`DownloadError::Transfer`] wrapping any other failure
    #[instrument(skip(self, destination), fields(destination = ?destination))]
    pub async fn download(
        &self,
        url: &str,
        destination: Option<&Path>,
        overwrite: bool,
    ) -> Result<PathBuf, DownloadError> {
        if let Some(path) = destination
            && !overwrite
            && !path.is_dir()
            && path.exists()
        {
            return Err(DownloadError::AlreadyExists {
                path: path.to_path_buf(),
            });
        }

        let operation = DownloadOperation {
            engine: self,
            destination,
            overwrite,
        };
        self.controller.access(url, true, &operation).await
    }

    /// Fetches `url` into memory.
    ///
    /// # Errors
    ///
    /// Same as [`Downloader::download`], minus the filesystem conditions.
    #[instrument(skip(self))]
    pub async fn fetch_bytes(&self, url: &str) -> Result<Bytes, DownloadError> {
        let operation = FetchBytesOperation { engine: self };
        self.controller.access(url, true, &operation).await
    }

    /// Reports existence and metadata of `url` without transferring its body.
    ///
    /// # Errors
    ///
    /// Returns the fetcher's error or one of the authentication errors.
    #[instrument(skip(self))]
    pub async fn check(&self, url: &str) -> Result<UrlInfo, DownloadError> {
        let operation = CheckOperation { engine: self };
        self.controller.access(url, true, &operation).await
    }

    fn failure_detector(&self) -> Option<&dyn AuthFailureDetector> {
        self.controller
            .authenticator()
            .and_then(|authenticator| authenticator.failure_detector())
    }

    /// Fails when a small body matches the authenticator's failure patterns.
    fn scan_for_auth_failure(
        &self,
        url: &str,
        target: &str,
        size: u64,
        body: impl FnOnce() -> Option<String>,
    ) -> Result<(), DownloadError> {
        if size >= AUTH_FAILURE_SCAN_LIMIT {
            return Ok(());
        }
        let Some(detector) = self.failure_detector() else {
            return Ok(());
        };
        let Some(text) = body() else {
            return Ok(());
        };
        if let Some(description) = detector.detect(&text) {
            return Err(DownloadError::AuthFailureDetected {
                url: url.to_string(),
                target: target.to_string(),
                description,
            });
        }
        Ok(())
    }

    async fn transfer_to_file(
        &self,
        url: &str,
        details: DownloadDetails,
        final_path: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let DownloadDetails {
            body,
            expected_size,
            ..
        } = details;
        let target = final_path.display().to_string();

        let temp = TempDownload::acquire(final_path).await?;
        let progress = self.progress.start(url, Some(&target), expected_size);
        {
            let mut writer = temp.writer()?;
            body.write_to(&mut writer, progress.as_ref()).await?;
            // Bodies may leave writes in flight; settle them before measuring.
            writer
                .flush()
                .await
                .map_err(|e| DownloadError::io(temp.path().to_path_buf(), e))?;
            writer
                .sync_all()
                .await
                .map_err(|e| DownloadError::io(temp.path().to_path_buf(), e))?;
        }
        progress.finish();

        let downloaded = temp.size()?;
        let text = if downloaded < AUTH_FAILURE_SCAN_LIMIT && self.failure_detector().is_some() {
            Some(temp.read_text().await?)
        } else {
            None
        };
        self.scan_for_auth_failure(url, &target, downloaded, || text)?;
        verify_size(&target, expected_size, downloaded)?;

        temp.persist()
    }
}

/// Checks the received size against the size announced by the source.
///
/// An announced size of zero is checked like any other.
fn verify_size(target: &str, expected: Option<u64>, actual: u64) -> Result<(), DownloadError> {
    match expected {
        Some(expected) if expected != actual => {
            error!(
                target_path = %target,
                expected,
                actual,
                "Downloaded size differs from original"
            );
            Err(DownloadError::integrity(target, expected, actual))
        }
        _ => Ok(()),
    }
}

/// Adds url/path context to failures that are not the pipeline's own verdicts.
fn contextualize(url: &str, path: &Path, error: DownloadError) -> DownloadError {
    match error {
        error if error.is_access_denied() => error,
        error @ (DownloadError::AlreadyExists { .. }
        | DownloadError::Integrity { .. }
        | DownloadError::AuthFailureDetected { .. }) => error,
        other => {
            error!(url = %url, path = %path.display(), error = %other, "Failed to download");
            DownloadError::transfer(url, path, other)
        }
    }
}

struct DownloadOperation<'a> {
    engine: &'a Downloader,
    destination: Option<&'a Path>,
    overwrite: bool,
}

#[async_trait]
impl<'a> Operation for DownloadOperation<'a> {
    type Output = PathBuf;

    async fn run(&self, url: &str, session: &Session) -> Result<PathBuf, DownloadError> {
        let details = self.engine.fetcher.download_details(url, session).await?;
        let final_path = resolve_final_path(
            self.destination,
            &details.suggested_filename,
            self.engine.base_dir.as_deref(),
        );

        if !self.overwrite && final_path.exists() {
            return Err(DownloadError::AlreadyExists { path: final_path });
        }

        info!(url = %url, path = %final_path.display(), "Downloading");
        let published = self
            .engine
            .transfer_to_file(url, details, &final_path)
            .await
            .map_err(|error| contextualize(url, &final_path, error))?;
        debug!(path = %published.display(), "download complete");
        Ok(published)
    }
}

struct FetchBytesOperation<'a> {
    engine: &'a Downloader,
}

#[async_trait]
impl<'a> Operation for FetchBytesOperation<'a> {
    type Output = Bytes;

    async fn run(&self, url: &str, session: &Session) -> Result<Bytes, DownloadError> {
        let DownloadDetails {
            body,
            expected_size,
            ..
        } = self.engine.fetcher.download_details(url, session).await?;

        let progress = self.engine.progress.start(url, None, expected_size);
        let mut buffer: Vec<u8> = Vec::new();
        let received = body.write_to(&mut buffer, progress.as_ref()).await?;
        progress.finish();

        self.engine
            .scan_for_auth_failure(url, MEMORY_TARGET, received, || {
                Some(String::from_utf8_lossy(&buffer).into_owned())
            })?;
        verify_size(MEMORY_TARGET, expected_size, received)?;
        Ok(Bytes::from(buffer))
    }
}

struct CheckOperation<'a> {
    engine: &'a Downloader,
}

#[async_trait]
impl<'a> Operation for CheckOperation<'a> {
    type Output = UrlInfo;

    async fn run(&self, url: &str, session: &Session) -> Result<UrlInfo, DownloadError> {
        self.engine.fetcher.check(url, session).await
    }
}

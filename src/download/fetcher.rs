//! Protocol collaborator contracts.
//!
//! A [`Fetcher`] knows one protocol. For a download it resolves
//! [`DownloadDetails`]: a [`FetchBody`] that writes the resource into a sink,
//! plus the announced size and a suggested filename. The engine owns
//! everything else (paths, temp files, integrity checks).

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWrite;

use super::DownloadError;
use super::progress::ProgressSink;
use crate::session::Session;

/// Writes a resource body into a sink.
#[async_trait]
pub trait FetchBody: Send {
    /// Streams the body into `sink`, reporting running totals to `progress`.
    ///
    /// Returns the number of bytes written. The caller flushes `sink` afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`] on transport or write failures; access
    /// denials surface as [`DownloadError::AccessDenied`].
    async fn write_to(
        self: Box<Self>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &dyn ProgressSink,
    ) -> Result<u64, DownloadError>;
}

/// Everything the engine needs to run one transfer.
pub struct DownloadDetails {
    /// Body writer.
    pub body: Box<dyn FetchBody>,
    /// Size announced by the source, if any.
    pub expected_size: Option<u64>,
    /// Filename derived from the URL or the response.
    pub suggested_filename: String,
}

impl std::fmt::Debug for DownloadDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadDetails")
            .field("expected_size", &self.expected_size)
            .field("suggested_filename", &self.suggested_filename)
            .finish_non_exhaustive()
    }
}

/// Existence and metadata of a remote resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlInfo {
    /// URL that was checked.
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    /// Protocol status code (HTTP status for HTTP sources).
    pub status: u16,
    /// Announced size in bytes.
    pub size: Option<u64>,
    /// Announced content type.
    pub content_type: Option<String>,
    /// Filename the resource would be saved under.
    pub filename: String,
    /// Last modification time as announced by the source.
    pub last_modified: Option<String>,
}

/// Protocol-specific access to remote resources.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Opens `url` for download within `session`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`]; access denials must be reported as
    /// [`DownloadError::AccessDenied`] so the access controller can act on them.
    async fn download_details(
        &self,
        url: &str,
        session: &Session,
    ) -> Result<DownloadDetails, DownloadError>;

    /// Reports existence and metadata for `url` without transferring the body.
    ///
    /// # Errors
    ///
    /// Same contract as [`Fetcher::download_details`].
    async fn check(&self, url: &str, session: &Session) -> Result<UrlInfo, DownloadError>;
}

impl std::fmt::Debug for dyn Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Fetcher")
    }
}

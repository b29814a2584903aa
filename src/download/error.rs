//! Error types for the download module.
//!
//! [`DownloadError`] is terminal for a single `access` call. The access-denied
//! variants ([`DownloadError::AccessDenied`] and
//! [`DownloadError::UnconfiguredProvider`]) form the "access denied" subset the
//! [`AccessController`](super::AccessController) inspects before deciding to
//! retry; see [`DownloadError::is_access_denied`].

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while accessing or downloading a remote resource.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error accessing {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout accessing {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response that is not an access denial.
    #[error("HTTP {status} accessing {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while preparing, writing or publishing a download.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Writing received content into the sink failed.
    #[error("failed writing content of {url}: {source}")]
    Write {
        /// The URL whose content was being written.
        url: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Destination exists and overwriting was not requested.
    #[error("file {path} already exists")]
    AlreadyExists {
        /// The destination that already exists.
        path: PathBuf,
    },

    /// Downloaded size does not match the size announced by the source.
    #[error("downloaded size {actual_bytes} differs from original {expected_bytes} for {target}")]
    Integrity {
        /// Destination the download was meant for (a path, or `memory`).
        target: String,
        /// Size announced by the source.
        expected_bytes: u64,
        /// Size actually received.
        actual_bytes: u64,
    },

    /// The body looked like an authentication failure page.
    #[error("download of {url} into {target} has failed: {description}")]
    AuthFailureDetected {
        /// The URL that was downloaded.
        url: String,
        /// Destination the download was meant for (a path, or `memory`).
        target: String,
        /// What the authenticator recognised in the body.
        description: String,
    },

    /// The source denied access (401, 403, 407 or a login redirect).
    ///
    /// This is the one variant the access controller retries around.
    #[error("access to {url} was denied (HTTP {status})")]
    AccessDenied {
        /// The URL that was denied.
        url: String,
        /// The HTTP status code, or 0 for a login redirect.
        status: u16,
    },

    /// Access was denied and no authentication is configured for this source.
    #[error(
        "access to {url} was denied but it is unknown whether this source requires authentication; configure a provider authenticator for it"
    )]
    UnconfiguredProvider {
        /// The URL that was denied.
        url: String,
    },

    /// Access was denied by a source that was declared not to require authentication.
    #[error(
        "failed to access {url}, which must be available without authentication but access was denied"
    )]
    DeniedWithoutAuthRequirement {
        /// The URL that was denied.
        url: String,
    },

    /// Authentication is required, a fresh session was used and access is still denied.
    #[error("failed to access {url} given available credentials (authentication is required)")]
    CredentialsRejected {
        /// The URL that was denied.
        url: String,
    },

    /// An authenticator requires authentication but does not implement it.
    #[error("authentication for {authenticator} is not yet implemented")]
    AuthNotImplemented {
        /// Name of the authenticator variant.
        authenticator: String,
    },

    /// An authenticator that requires authentication has no credential to use.
    #[error("authenticator {authenticator} requires a credential but none was provided")]
    MissingCredential {
        /// Name of the authenticator variant.
        authenticator: String,
    },

    /// Credential values are absent or could not be entered.
    #[error("credential {name} is unusable: {reason}")]
    Credential {
        /// Credential name.
        name: String,
        /// Why it could not be used.
        reason: String,
    },

    /// Interactive prompt failed.
    #[error("prompt failed: {reason}")]
    Prompt {
        /// Underlying prompt failure.
        reason: String,
    },

    /// A download attempt failed for a reason other than an access denial.
    #[error("failed to download {url} into {path}: {source}")]
    Transfer {
        /// The URL being downloaded.
        url: String,
        /// The destination path.
        path: PathBuf,
        /// Proximate cause.
        #[source]
        source: Box<DownloadError>,
    },

    /// The access loop revisited states it should never revisit.
    ///
    /// This signals a defect in the decision procedure, not a user-facing
    /// retry exhaustion.
    #[error("internal error: reached attempt {attempts} while accessing {url}")]
    AttemptLimitExceeded {
        /// The URL being accessed.
        url: String,
        /// Attempt number that tripped the guard.
        attempts: u32,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a sink write error.
    pub fn write(url: impl Into<String>, source: std::io::Error) -> Self {
        Self::Write {
            url: url.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(target: impl Into<String>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Integrity {
            target: target.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates an access-denied error.
    pub fn access_denied(url: impl Into<String>, status: u16) -> Self {
        Self::AccessDenied {
            url: url.into(),
            status,
        }
    }

    /// Creates a credential error.
    pub fn credential(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Credential {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wraps an unexpected failure of a download attempt with its context.
    pub fn transfer(url: impl Into<String>, path: impl Into<PathBuf>, source: Self) -> Self {
        Self::Transfer {
            url: url.into(),
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Returns true for the access-denied subset of errors.
    #[must_use]
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            Self::AccessDenied { .. } | Self::UnconfiguredProvider { .. }
        )
    }
}

// Like the other error types in this crate, no `From<reqwest::Error>` or
// `From<std::io::Error>`: every variant needs the url or path the source error lacks.

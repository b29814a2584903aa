//! Authenticated access and atomic downloads.
//!
//! This module provides the access loop ([`AccessController`]) that handles
//! session reuse, authentication and access denials for any [`Operation`],
//! and the [`Downloader`] built on it, which publishes files atomically.
//!
//! # Features
//!
//! - Per-origin session reuse with a forced fresh session after a denial
//! - Credential re-entry prompts when a fresh session is still denied
//! - Temporary-file staging with an exclusive lock and rename-on-success
//! - Size verification and in-band authentication failure detection
//! - Structured error types with full context
//!
//! # Example
//!
//! ```no_run
//! use authdl_core::auth::{HttpBasicAuthenticator, UserPassword};
//! use authdl_core::download::Downloader;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = Downloader::http().with_authenticator(
//!     Arc::new(HttpBasicAuthenticator::new()),
//!     Some(Arc::new(UserPassword::new("archive", "alice", "secret"))),
//! )?;
//! let bytes = downloader.fetch_bytes("https://example.com/private/data.csv").await?;
//! println!("Fetched {} bytes", bytes.len());
//! # Ok(())
//! # }
//! ```

mod access;
mod client;
pub mod constants;
mod engine;
mod error;
mod fetcher;
pub mod filename;
mod progress;
mod temp;

pub use access::{AccessController, AccessDecision, DenialVerdict, Operation, decide};
pub use client::HttpFetcher;
pub(crate) use client::build_client;
pub use engine::Downloader;
pub use error::DownloadError;
pub use fetcher::{DownloadDetails, FetchBody, Fetcher, UrlInfo};
pub use progress::{
    NoProgress, ProgressBarSink, ProgressFactory, ProgressSink, SilentProgress, TerminalProgress,
};
pub use temp::TempDownload;

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.

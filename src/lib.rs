//! Authenticated download core library.
//!
//! Downloads remote resources into local files (or memory) through a retry
//! loop that knows about sessions, authentication requirements and
//! credential re-entry, and publishes files only once they are complete.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`auth`] - Authenticators, credentials and failure-page detection
//! - [`download`] - Access loop, protocol fetchers and the atomic download pipeline
//! - [`session`] - Per-origin sessions and their cache
//! - [`ui`] - Interactive prompts for credential re-entry

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod download;
pub mod session;
pub mod ui;
mod user_agent;

// Re-export commonly used types
pub use auth::{
    AuthRequirement, Authenticator, BearerTokenAuthenticator, Credential, HttpBasicAuthenticator,
    NoAuthentication, PatternFailureDetector, Token, UnimplementedAuthenticator, UserPassword,
};
pub use download::{AccessController, DownloadError, Downloader, HttpFetcher, UrlInfo};
pub use session::{Session, SessionProvider, SessionStore};
pub use ui::{DialoguerPrompter, NonInteractive, Prompter};

//! Authentication strategies and credentials.
//!
//! An [`Authenticator`] says whether a source needs authentication
//! ([`AuthRequirement`]), knows how to authenticate a [`Session`], and may be
//! able to recognise authentication failure pages in a response body.
//!
//! - [`NoAuthentication`] - source is known to be public
//! - [`UnimplementedAuthenticator`] - source needs auth we cannot perform
//! - [`HttpBasicAuthenticator`] - HTTP Basic with a [`UserPassword`] credential
//! - [`BearerTokenAuthenticator`] - bearer token with a [`Token`] credential

mod credential;
mod failure;

pub use credential::{Credential, CredentialValues, Token, UserPassword};
pub use failure::{AuthFailureDetector, PatternFailureDetector};

use std::fmt;

use async_trait::async_trait;
use tracing::debug;

use crate::download::DownloadError;
use crate::session::{Session, SessionAuth};

/// What is known about a source's need for authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    /// The source requires authentication.
    Required,
    /// The source is known to be public.
    NotRequired,
    /// Nobody has told us.
    Unknown,
}

impl AuthRequirement {
    /// Stable label for logs and messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::NotRequired => "not required",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AuthRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strategy describing whether and how to authenticate to a source.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Variant name used in error messages.
    fn name(&self) -> &str;

    /// Whether the source requires authentication.
    fn requirement(&self) -> AuthRequirement;

    /// Authenticates a freshly established session.
    ///
    /// The default fails for sources that require authentication, naming the
    /// variant that lacks an implementation.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::AuthNotImplemented`] by default, or a
    /// variant-specific error when authentication cannot be performed.
    async fn authenticate(
        &self,
        _session: &Session,
        _credential: Option<&dyn Credential>,
    ) -> Result<(), DownloadError> {
        if self.requirement() == AuthRequirement::Required {
            return Err(DownloadError::AuthNotImplemented {
                authenticator: self.name().to_string(),
            });
        }
        Ok(())
    }

    /// In-band failure detection, for variants that support it.
    fn failure_detector(&self) -> Option<&dyn AuthFailureDetector> {
        None
    }
}

impl fmt::Debug for dyn Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("name", &self.name())
            .field("requirement", &self.requirement())
            .finish()
    }
}

/// Source is explicitly known not to require authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuthentication;

#[async_trait]
impl Authenticator for NoAuthentication {
    fn name(&self) -> &str {
        "NoAuthentication"
    }

    fn requirement(&self) -> AuthRequirement {
        AuthRequirement::NotRequired
    }
}

/// Source requires authentication of a kind that is not implemented.
#[derive(Debug, Clone)]
pub struct UnimplementedAuthenticator {
    kind: String,
}

impl UnimplementedAuthenticator {
    /// Creates a placeholder for the named authentication kind.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into() }
    }
}

#[async_trait]
impl Authenticator for UnimplementedAuthenticator {
    fn name(&self) -> &str {
        &self.kind
    }

    fn requirement(&self) -> AuthRequirement {
        AuthRequirement::Required
    }
}

/// HTTP Basic authentication.
#[derive(Debug, Default)]
pub struct HttpBasicAuthenticator {
    failure: Option<PatternFailureDetector>,
}

impl HttpBasicAuthenticator {
    /// Creates a Basic authenticator without in-band failure detection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds in-band failure detection.
    #[must_use]
    pub fn with_failure_detector(mut self, detector: PatternFailureDetector) -> Self {
        self.failure = (!detector.is_empty()).then_some(detector);
        self
    }
}

#[async_trait]
impl Authenticator for HttpBasicAuthenticator {
    fn name(&self) -> &str {
        "HttpBasicAuthenticator"
    }

    fn requirement(&self) -> AuthRequirement {
        AuthRequirement::Required
    }

    async fn authenticate(
        &self,
        session: &Session,
        credential: Option<&dyn Credential>,
    ) -> Result<(), DownloadError> {
        let credential = credential.ok_or_else(|| DownloadError::MissingCredential {
            authenticator: self.name().to_string(),
        })?;
        match credential.values() {
            Some(CredentialValues::UserPassword { username, password }) => {
                debug!(origin = %session.origin(), username = %username, "applying basic auth");
                session.set_auth(SessionAuth::Basic {
                    username,
                    password: Some(password),
                });
                Ok(())
            }
            Some(CredentialValues::Token(_)) => Err(DownloadError::credential(
                credential.name(),
                "basic authentication needs a user name and password",
            )),
            None => Err(DownloadError::credential(
                credential.name(),
                "no user name and password entered",
            )),
        }
    }

    fn failure_detector(&self) -> Option<&dyn AuthFailureDetector> {
        self.failure
            .as_ref()
            .map(|detector| detector as &dyn AuthFailureDetector)
    }
}

/// Bearer token authentication.
#[derive(Debug, Default)]
pub struct BearerTokenAuthenticator {
    failure: Option<PatternFailureDetector>,
}

impl BearerTokenAuthenticator {
    /// Creates a bearer authenticator without in-band failure detection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds in-band failure detection.
    #[must_use]
    pub fn with_failure_detector(mut self, detector: PatternFailureDetector) -> Self {
        self.failure = (!detector.is_empty()).then_some(detector);
        self
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    fn name(&self) -> &str {
        "BearerTokenAuthenticator"
    }

    fn requirement(&self) -> AuthRequirement {
        AuthRequirement::Required
    }

    async fn authenticate(
        &self,
        session: &Session,
        credential: Option<&dyn Credential>,
    ) -> Result<(), DownloadError> {
        let credential = credential.ok_or_else(|| DownloadError::MissingCredential {
            authenticator: self.name().to_string(),
        })?;
        match credential.values() {
            Some(CredentialValues::Token(token)) => {
                debug!(origin = %session.origin(), "applying bearer token");
                session.set_auth(SessionAuth::Bearer(token));
                Ok(())
            }
            Some(CredentialValues::UserPassword { .. }) => Err(DownloadError::credential(
                credential.name(),
                "bearer authentication needs a token",
            )),
            None => Err(DownloadError::credential(credential.name(), "no token entered")),
        }
    }

    fn failure_detector(&self) -> Option<&dyn AuthFailureDetector> {
        self.failure
            .as_ref()
            .map(|detector| detector as &dyn AuthFailureDetector)
    }
}

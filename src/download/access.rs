//! Authenticated-access retry loop.
//!
//! [`AccessController::access`] runs one logical [`Operation`] against a URL,
//! establishing (or reusing) a session first. When the operation reports an
//! access denial, [`decide`] maps what is known about the source's
//! authentication requirement and the freshness of the session onto the next
//! step:
//!
//! | requirement   | session | next step                              |
//! |---------------|---------|----------------------------------------|
//! | required      | reused  | retry with a fresh session             |
//! | required      | fresh   | offer credential re-entry, then retry  |
//! | not required  | any     | fail: requirement contradicted         |
//! | unknown       | any     | fail: provider not configured          |
//!
//! Other errors propagate immediately. The loop is capped at
//! [`MAX_ACCESS_ATTEMPTS`]; reaching the cap is a bug, not a retry budget.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, trace, warn};

use super::DownloadError;
use super::constants::MAX_ACCESS_ATTEMPTS;
use crate::auth::{AuthRequirement, Authenticator, Credential};
use crate::session::{Session, SessionProvider};
use crate::ui::{NonInteractive, Prompter};

/// A unit of work run inside the access loop.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Value produced on success.
    type Output: Send;

    /// Runs the operation for `url` within `session`.
    ///
    /// # Errors
    ///
    /// Access denials must be reported through the access-denied variants of
    /// [`DownloadError`]; anything else ends the access call.
    async fn run(&self, url: &str, session: &Session) -> Result<Self::Output, DownloadError>;
}

/// Why a denial ends the access call without another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialVerdict {
    /// The source was declared public but denied access.
    Contradicted,
    /// Nothing is known about the source's authentication.
    Unconfigured,
}

/// Next step after an access denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Establish a fresh session before concluding the credentials are bad.
    RetryFresh,
    /// Ask whether to re-enter credentials; retry with a fresh session if so.
    PromptAndRetry,
    /// Stop.
    Fail(DenialVerdict),
}

/// Decision table for an access denial.
#[must_use]
pub fn decide(requirement: AuthRequirement, session_reused: bool) -> AccessDecision {
    match (requirement, session_reused) {
        (AuthRequirement::Required, true) => AccessDecision::RetryFresh,
        (AuthRequirement::Required, false) => AccessDecision::PromptAndRetry,
        (AuthRequirement::NotRequired, _) => AccessDecision::Fail(DenialVerdict::Contradicted),
        (AuthRequirement::Unknown, _) => AccessDecision::Fail(DenialVerdict::Unconfigured),
    }
}

/// Runs operations through the session/authentication retry loop.
#[derive(Debug, Clone)]
pub struct AccessController {
    sessions: Arc<dyn SessionProvider>,
    authenticator: Option<Arc<dyn Authenticator>>,
    credential: Option<Arc<dyn Credential>>,
    prompter: Arc<dyn Prompter>,
}

impl AccessController {
    /// Creates a controller with no authenticator and a non-interactive prompter.
    #[must_use]
    pub fn new(sessions: Arc<dyn SessionProvider>) -> Self {
        Self {
            sessions,
            authenticator: None,
            credential: None,
            prompter: Arc::new(NonInteractive),
        }
    }

    /// Attaches an authenticator and the credential it consumes.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::MissingCredential`] when the authenticator
    /// requires authentication but no credential is given.
    pub fn with_authenticator(
        mut self,
        authenticator: Arc<dyn Authenticator>,
        credential: Option<Arc<dyn Credential>>,
    ) -> Result<Self, DownloadError> {
        if authenticator.requirement() == AuthRequirement::Required && credential.is_none() {
            return Err(DownloadError::MissingCredential {
                authenticator: authenticator.name().to_string(),
            });
        }
        self.authenticator = Some(authenticator);
        self.credential = credential;
        Ok(self)
    }

    /// Replaces the prompter used for credential re-entry.
    #[must_use]
    pub fn with_prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Attached authenticator, if any.
    #[must_use]
    pub fn authenticator(&self) -> Option<&Arc<dyn Authenticator>> {
        self.authenticator.as_ref()
    }

    /// Authentication requirement of the source; `Unknown` without an authenticator.
    #[must_use]
    pub fn requirement(&self) -> AuthRequirement {
        self.authenticator
            .as_ref()
            .map_or(AuthRequirement::Unknown, |auth| auth.requirement())
    }

    /// Runs `operation` for `url`, retrying around access denials.
    ///
    /// # Errors
    ///
    /// Returns the operation's error when it is not an access denial, one of
    /// the terminal authentication errors when the decision table says stop,
    /// or [`DownloadError::AttemptLimitExceeded`] if the loop runs away.
    #[instrument(skip(self, operation), fields(requirement = %self.requirement()))]
    pub async fn access<O: Operation>(
        &self,
        url: &str,
        allow_reuse: bool,
        operation: &O,
    ) -> Result<O::Output, DownloadError> {
        let requirement = self.requirement();
        let mut allow_reuse = allow_reuse;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            if attempt > MAX_ACCESS_ATTEMPTS {
                return Err(DownloadError::AttemptLimitExceeded {
                    url: url.to_string(),
                    attempts: attempt,
                });
            }

            let session = self.sessions.establish(url, allow_reuse).await?;
            if !allow_reuse && session.is_reused() {
                warn!(url = %url, "session provider reused a session although a fresh one was requested");
            }
            if !session.is_reused() && requirement == AuthRequirement::Required {
                self.authenticate(&session).await?;
            }

            trace!(attempt, reused = session.is_reused(), "calling operation");
            let denial = match operation.run(url, &session).await {
                Ok(output) => return Ok(output),
                Err(error) if error.is_access_denied() => error,
                Err(error) => return Err(error),
            };
            debug!(attempt, error = %denial, "access was denied");

            match decide(requirement, session.is_reused()) {
                AccessDecision::RetryFresh => {
                    allow_reuse = false;
                }
                AccessDecision::PromptAndRetry => {
                    if !self.reenter_credentials(url)? {
                        return Err(DownloadError::CredentialsRejected {
                            url: url.to_string(),
                        });
                    }
                    allow_reuse = false;
                }
                AccessDecision::Fail(DenialVerdict::Contradicted) => {
                    return Err(DownloadError::DeniedWithoutAuthRequirement {
                        url: url.to_string(),
                    });
                }
                AccessDecision::Fail(DenialVerdict::Unconfigured) => {
                    return Err(DownloadError::UnconfiguredProvider {
                        url: url.to_string(),
                    });
                }
            }
        }
    }

    async fn authenticate(&self, session: &Session) -> Result<(), DownloadError> {
        let Some(authenticator) = self.authenticator.as_ref() else {
            return Ok(());
        };
        debug!(authenticator = authenticator.name(), origin = %session.origin(), "authenticating fresh session");
        authenticator
            .authenticate(session, self.credential.as_deref())
            .await
    }

    /// Returns true when the user entered new credentials.
    fn reenter_credentials(&self, url: &str) -> Result<bool, DownloadError> {
        let Some(credential) = self.credential.as_ref() else {
            return Ok(false);
        };
        let accepted = self.prompter.yes_no(
            &format!("Authentication to access {url} has failed"),
            "Do you want to enter other credentials in case they were updated?",
        )?;
        if accepted {
            credential.enter_new(self.prompter.as_ref())?;
            info!(credential = credential.name(), "retrying with updated credentials");
        }
        Ok(accepted)
    }
}

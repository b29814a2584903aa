//! Secret material consumed by authenticators.
//!
//! Credentials use interior mutability so one `Arc<dyn Credential>` can be
//! shared between the caller, the authenticator and the access controller,
//! and updated in place when the user re-enters values.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use tracing::info;

use crate::download::DownloadError;
use crate::ui::Prompter;

/// Current values of a credential.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialValues {
    /// User name and password.
    UserPassword {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
    /// Single secret token.
    Token(String),
}

impl fmt::Debug for CredentialValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserPassword { username, .. } => f
                .debug_struct("UserPassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Token(_) => f.write_str("Token(<redacted>)"),
        }
    }
}

/// Holder of secret material for one source.
pub trait Credential: Send + Sync {
    /// Name identifying this credential (usually the provider name).
    fn name(&self) -> &str;

    /// Whether all required fields are present.
    fn has_valid_values(&self) -> bool;

    /// Asks the user for new values and replaces the current ones.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Prompt`] if prompting fails, or
    /// [`DownloadError::Credential`] if the entered values are incomplete.
    fn enter_new(&self, prompter: &dyn Prompter) -> Result<(), DownloadError>;

    /// Returns a copy of the current values, if any.
    fn values(&self) -> Option<CredentialValues>;
}

impl fmt::Debug for dyn Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name())
            .field("valid", &self.has_valid_values())
            .finish()
    }
}

/// User name and password credential.
pub struct UserPassword {
    name: String,
    username: RwLock<Option<String>>,
    password: RwLock<Option<String>>,
}

impl fmt::Debug for UserPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserPassword")
            .field("name", &self.name)
            .field("username", &self.username())
            .finish_non_exhaustive()
    }
}

impl UserPassword {
    /// Creates an empty credential that will be filled in interactively.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            username: RwLock::new(None),
            password: RwLock::new(None),
        }
    }

    /// Creates a credential with known values.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            username: RwLock::new(Some(username.into())),
            password: RwLock::new(Some(password.into())),
        }
    }

    /// Creates a credential with a known user name and no password yet.
    #[must_use]
    pub fn with_username(name: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            username: RwLock::new(Some(username.into())),
            password: RwLock::new(None),
        }
    }

    /// Current user name.
    #[must_use]
    pub fn username(&self) -> Option<String> {
        self.username
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn password(&self) -> Option<String> {
        self.password
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Credential for UserPassword {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_valid_values(&self) -> bool {
        self.username().is_some_and(|u| !u.trim().is_empty()) && self.password().is_some()
    }

    fn enter_new(&self, prompter: &dyn Prompter) -> Result<(), DownloadError> {
        let current = self.username();
        let username = prompter.input(&format!("{} user name", self.name), current.as_deref())?;
        if username.trim().is_empty() {
            return Err(DownloadError::credential(&self.name, "user name is empty"));
        }
        let password = prompter.password(&format!("{} password", self.name))?;

        *self.username.write().unwrap_or_else(PoisonError::into_inner) = Some(username);
        *self.password.write().unwrap_or_else(PoisonError::into_inner) = Some(password);
        info!(credential = %self.name, "credential updated");
        Ok(())
    }

    fn values(&self) -> Option<CredentialValues> {
        Some(CredentialValues::UserPassword {
            username: self.username()?,
            password: self.password()?,
        })
    }
}

/// Single secret token credential.
pub struct Token {
    name: String,
    token: RwLock<Option<String>>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Token {
    /// Creates an empty token credential.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: RwLock::new(None),
        }
    }

    /// Creates a token credential with a known value.
    #[must_use]
    pub fn new(name: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            token: RwLock::new(Some(token.into())),
        }
    }

    fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Credential for Token {
    fn name(&self) -> &str {
        &self.name
    }

    fn has_valid_values(&self) -> bool {
        self.token().is_some_and(|t| !t.trim().is_empty())
    }

    fn enter_new(&self, prompter: &dyn Prompter) -> Result<(), DownloadError> {
        let token = prompter.password(&format!("{} token", self.name))?;
        if token.trim().is_empty() {
            return Err(DownloadError::credential(&self.name, "token is empty"));
        }
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        info!(credential = %self.name, "credential updated");
        Ok(())
    }

    fn values(&self) -> Option<CredentialValues> {
        self.token().map(CredentialValues::Token)
    }
}

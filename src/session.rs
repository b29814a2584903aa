//! Reusable access sessions (cookies, auth material, connection pool).
//!
//! A [`Session`] is cheap to clone: clones share the cookie jar, the HTTP
//! client and whatever authentication material an authenticator stored in it.
//! Each handle also records whether it was freshly established or carried
//! over from an earlier attempt, which the access controller relies on.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::cookie::Jar;
use reqwest::{Client, Method, RequestBuilder};
use tracing::{debug, instrument};
use url::Url;

use crate::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use crate::download::{DownloadError, build_client};

/// Authentication material attached to a session by an authenticator.
#[derive(Clone, PartialEq, Eq)]
pub enum SessionAuth {
    /// HTTP Basic authentication.
    Basic {
        /// User name.
        username: String,
        /// Password, if any.
        password: Option<String>,
    },
    /// Bearer token authentication.
    Bearer(String),
}

impl fmt::Debug for SessionAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

struct SessionInner {
    client: Client,
    auth: RwLock<Option<SessionAuth>>,
}

/// Access context for one source origin.
#[derive(Clone)]
pub struct Session {
    origin: String,
    reused: bool,
    inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("origin", &self.origin)
            .field("reused", &self.reused)
            .field("authenticated", &self.auth().is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a fresh session around a client already bound to its cookie jar.
    #[must_use]
    pub fn new(origin: impl Into<String>, client: Client) -> Self {
        Self {
            origin: origin.into(),
            reused: false,
            inner: Arc::new(SessionInner {
                client,
                auth: RwLock::new(None),
            }),
        }
    }

    /// Creates a fresh session with a new cookie jar and explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`] if the HTTP client cannot be built.
    pub fn with_timeouts(
        origin: impl Into<String>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, DownloadError> {
        let origin = origin.into();
        let jar = Arc::new(Jar::default());
        let client = build_client(jar, connect_timeout_secs, read_timeout_secs)
            .map_err(|e| DownloadError::network(origin.clone(), e))?;
        Ok(Self::new(origin, client))
    }

    /// Origin (`scheme://host:port`) this session belongs to.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Whether this handle was carried over from an earlier attempt.
    #[must_use]
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    /// Returns a handle to the same session tagged as reused.
    #[must_use]
    pub fn as_reused(&self) -> Self {
        Self {
            origin: self.origin.clone(),
            reused: true,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Stores authentication material used by later requests.
    pub fn set_auth(&self, auth: SessionAuth) {
        *self
            .inner
            .auth
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(auth);
    }

    /// Returns the stored authentication material, if any.
    #[must_use]
    pub fn auth(&self) -> Option<SessionAuth> {
        self.inner
            .auth
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Builds a request carrying this session's cookies and authentication.
    #[must_use]
    pub fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.inner.client.request(method, url);
        match self.auth() {
            Some(SessionAuth::Basic { username, password }) => {
                builder.basic_auth(username, password)
            }
            Some(SessionAuth::Bearer(token)) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Establishes sessions for URLs.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Returns a session for `url`.
    ///
    /// With `allow_reuse` a previously established session may be returned
    /// (tagged reused); without it a fresh one must be built.
    async fn establish(&self, url: &str, allow_reuse: bool) -> Result<Session, DownloadError>;
}

impl fmt::Debug for dyn SessionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionProvider")
    }
}

/// Concurrent per-origin session cache.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Creates an empty store with default timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates an empty store whose sessions use explicit timeouts.
    #[must_use]
    pub fn with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            connect_timeout_secs,
            read_timeout_secs,
        }
    }

    /// Number of cached sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionProvider for SessionStore {
    #[instrument(level = "debug", skip(self))]
    async fn establish(&self, url: &str, allow_reuse: bool) -> Result<Session, DownloadError> {
        let origin = origin_of(url)?;

        if allow_reuse && let Some(existing) = self.sessions.get(&origin) {
            debug!(origin = %origin, "reusing session");
            return Ok(existing.as_reused());
        }

        let session = Session::with_timeouts(
            origin.clone(),
            self.connect_timeout_secs,
            self.read_timeout_secs,
        )?;
        debug!(origin = %origin, "established fresh session");
        self.sessions.insert(origin, session.clone());
        Ok(session)
    }
}

/// Session cache key for a URL: its ASCII-serialised origin.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidUrl`] for unparsable or opaque-origin URLs.
pub fn origin_of(url: &str) -> Result<String, DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
    let origin = parsed.origin();
    if !origin.is_tuple() {
        return Err(DownloadError::invalid_url(url));
    }
    Ok(origin.ascii_serialization())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_session_is_fresh_then_reused() {
        let store = SessionStore::new();

        let first = store.establish("https://example.com/a", true).await.unwrap();
        assert!(!first.is_reused());

        let second = store.establish("https://example.com/b", true).await.unwrap();
        assert!(second.is_reused());
        assert_eq!(second.origin(), "https://example.com");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_disallowing_reuse_replaces_session() {
        let store = SessionStore::new();

        let first = store.establish("https://example.com/a", true).await.unwrap();
        first.set_auth(SessionAuth::Bearer("old".to_string()));

        let fresh = store.establish("https://example.com/a", false).await.unwrap();
        assert!(!fresh.is_reused());
        assert!(fresh.auth().is_none(), "fresh session must not inherit auth");

        let reused = store.establish("https://example.com/a", true).await.unwrap();
        assert!(reused.is_reused());
        assert!(reused.auth().is_none(), "cache must hold the replacement");
    }

    #[tokio::test]
    async fn test_sessions_are_keyed_by_origin() {
        let store = SessionStore::new();
        store.establish("https://a.example.com/x", true).await.unwrap();
        let other = store.establish("https://b.example.com/x", true).await.unwrap();
        assert!(!other.is_reused());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_auth_is_shared_between_handles_and_redacted() {
        let session = Session::with_timeouts("https://example.com", 5, 5).unwrap();
        let reused = session.as_reused();
        session.set_auth(SessionAuth::Basic {
            username: "alice".to_string(),
            password: Some("hunter2".to_string()),
        });

        assert_eq!(session.auth(), reused.auth());
        let debug = format!("{:?}", reused.auth().unwrap());
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_origin_of_rejects_invalid_urls() {
        assert_eq!(
            origin_of("http://example:8080/data.bin").unwrap(),
            "http://example:8080"
        );
        assert!(matches!(
            origin_of("not a url"),
            Err(DownloadError::InvalidUrl { .. })
        ));
    }
}

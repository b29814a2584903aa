//! Scripted collaborators for exercising the access loop without a network.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use authdl_core::auth::{
    AuthFailureDetector, AuthRequirement, Authenticator, Credential, PatternFailureDetector,
};
use authdl_core::download::{
    DownloadDetails, DownloadError, FetchBody, Fetcher, ProgressSink, UrlInfo,
};
use authdl_core::session::{Session, SessionProvider, origin_of};
use authdl_core::ui::Prompter;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// What the fake fetcher does on one call.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Report an access denial (HTTP 401).
    Deny,
    /// Serve `content`, announcing `expected_size`.
    Serve {
        content: Vec<u8>,
        expected_size: Option<u64>,
        filename: String,
    },
    /// Serve the headers, then fail with a timeout while writing the body.
    BreakMidBody { partial: Vec<u8> },
}

impl Outcome {
    pub fn serve(content: &[u8], filename: &str) -> Self {
        Self::Serve {
            content: content.to_vec(),
            expected_size: Some(content.len() as u64),
            filename: filename.to_string(),
        }
    }
}

/// Fetcher following a script; the last entry repeats once the script runs out.
#[derive(Debug)]
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(script: impl IntoIterator<Item = Outcome>) -> Self {
        let script: VecDeque<Outcome> = script.into_iter().collect();
        let fallback = script.back().cloned().unwrap_or(Outcome::Deny);
        Self {
            script: Mutex::new(script),
            fallback,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(outcome: Outcome) -> Self {
        Self::new([outcome])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next(&self) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn download_details(
        &self,
        url: &str,
        _session: &Session,
    ) -> Result<DownloadDetails, DownloadError> {
        match self.next() {
            Outcome::Deny => Err(DownloadError::access_denied(url, 401)),
            Outcome::Serve {
                content,
                expected_size,
                filename,
            } => Ok(DownloadDetails {
                body: Box::new(StaticBody {
                    content,
                    fail_after: false,
                }),
                expected_size,
                suggested_filename: filename,
            }),
            Outcome::BreakMidBody { partial } => Ok(DownloadDetails {
                expected_size: Some(partial.len() as u64 * 2),
                body: Box::new(StaticBody {
                    content: partial,
                    fail_after: true,
                }),
                suggested_filename: "broken.bin".to_string(),
            }),
        }
    }

    async fn check(&self, url: &str, _session: &Session) -> Result<UrlInfo, DownloadError> {
        match self.next() {
            Outcome::Deny => Err(DownloadError::access_denied(url, 403)),
            Outcome::Serve {
                content,
                filename,
                ..
            } => Ok(UrlInfo {
                url: url.to_string(),
                final_url: url.to_string(),
                status: 200,
                size: Some(content.len() as u64),
                content_type: None,
                filename,
                last_modified: None,
            }),
            Outcome::BreakMidBody { .. } => Err(DownloadError::timeout(url)),
        }
    }
}

struct StaticBody {
    content: Vec<u8>,
    fail_after: bool,
}

#[async_trait]
impl FetchBody for StaticBody {
    async fn write_to(
        self: Box<Self>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &dyn ProgressSink,
    ) -> Result<u64, DownloadError> {
        // No flush: settling the sink is the engine's job.
        sink.write_all(&self.content)
            .await
            .map_err(|e| DownloadError::write("fake://body", e))?;
        progress.update(self.content.len() as u64);
        if self.fail_after {
            return Err(DownloadError::timeout("fake://body"));
        }
        Ok(self.content.len() as u64)
    }
}

/// Session provider recording every `allow_reuse` flag it is asked with.
#[derive(Debug, Default)]
pub struct RecordingSessions {
    cached: Mutex<Option<Session>>,
    requests: Mutex<Vec<bool>>,
}

impl RecordingSessions {
    /// Provider that already holds a session, so the first reuse request is honoured.
    pub fn with_cached(url: &str) -> Self {
        let provider = Self::default();
        *provider.cached.lock().unwrap() = Some(new_session(url));
        provider
    }

    /// `allow_reuse` flags in call order.
    pub fn requests(&self) -> Vec<bool> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionProvider for RecordingSessions {
    async fn establish(&self, url: &str, allow_reuse: bool) -> Result<Session, DownloadError> {
        self.requests.lock().unwrap().push(allow_reuse);
        let mut cached = self.cached.lock().unwrap();
        if allow_reuse && let Some(existing) = cached.as_ref() {
            return Ok(existing.as_reused());
        }
        let session = new_session(url);
        *cached = Some(session.clone());
        Ok(session)
    }
}

fn new_session(url: &str) -> Session {
    Session::with_timeouts(origin_of(url).unwrap(), 5, 5).unwrap()
}

/// Prompter answering yes/no from a script (then "no") and counting questions.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: Mutex<VecDeque<bool>>,
    questions: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn answering(answers: impl IntoIterator<Item = bool>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().collect()),
            questions: Mutex::new(Vec::new()),
        }
    }

    pub fn declining() -> Self {
        Self::default()
    }

    pub fn question_count(&self) -> usize {
        self.questions.lock().unwrap().len()
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn yes_no(&self, title: &str, _text: &str) -> Result<bool, DownloadError> {
        self.questions.lock().unwrap().push(title.to_string());
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(false))
    }

    fn input(&self, _prompt: &str, default: Option<&str>) -> Result<String, DownloadError> {
        Ok(default.unwrap_or("user").to_string())
    }

    fn password(&self, _prompt: &str) -> Result<String, DownloadError> {
        Ok("new-password".to_string())
    }
}

/// Authenticator with a configurable requirement that counts calls.
#[derive(Debug)]
pub struct CountingAuthenticator {
    requirement: AuthRequirement,
    calls: AtomicUsize,
    detector: Option<PatternFailureDetector>,
}

impl CountingAuthenticator {
    pub fn new(requirement: AuthRequirement) -> Self {
        Self {
            requirement,
            calls: AtomicUsize::new(0),
            detector: None,
        }
    }

    pub fn detecting(requirement: AuthRequirement, patterns: &[&str]) -> Self {
        Self {
            detector: Some(PatternFailureDetector::new(patterns).unwrap()),
            ..Self::new(requirement)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authenticator for CountingAuthenticator {
    fn name(&self) -> &str {
        "CountingAuthenticator"
    }

    fn requirement(&self) -> AuthRequirement {
        self.requirement
    }

    async fn authenticate(
        &self,
        _session: &Session,
        _credential: Option<&dyn Credential>,
    ) -> Result<(), DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn failure_detector(&self) -> Option<&dyn AuthFailureDetector> {
        self.detector
            .as_ref()
            .map(|detector| detector as &dyn AuthFailureDetector)
    }
}

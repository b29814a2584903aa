//! In-band authentication failure detection.
//!
//! Many sources answer with a 200 and a login page instead of a proper denial.
//! Authenticators that know what such a page looks like expose an
//! [`AuthFailureDetector`].

use regex::{Regex, RegexSet};

/// Recognises authentication failure pages in short response bodies.
pub trait AuthFailureDetector: Send + Sync {
    /// Returns a description of the failure when `body` looks like one.
    fn detect(&self, body: &str) -> Option<String>;
}

/// Detector driven by a list of regular expressions.
#[derive(Debug, Clone)]
pub struct PatternFailureDetector {
    patterns: Vec<Regex>,
    set: RegexSet,
}

impl PatternFailureDetector {
    /// Compiles the given patterns.
    ///
    /// # Errors
    ///
    /// Returns the regex error for the first invalid pattern.
    pub fn new<I, S>(patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| Regex::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let set = RegexSet::new(patterns.iter().map(Regex::as_str))?;
        Ok(Self { patterns, set })
    }

    /// Whether no pattern is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl AuthFailureDetector for PatternFailureDetector {
    fn detect(&self, body: &str) -> Option<String> {
        let index = self.set.matches(body).into_iter().next()?;
        let pattern = &self.patterns[index];
        let matched = pattern.find(body).map_or("", |m| m.as_str());
        Some(format!(
            "authentication failure page detected (matched '{}': \"{}\")",
            pattern.as_str(),
            matched.trim()
        ))
    }
}

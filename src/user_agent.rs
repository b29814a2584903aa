//! User-Agent string for outgoing requests.

/// Default User-Agent for download and check requests (identifies the tool).
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("authdl/{version} (authenticated-download-engine)")
}

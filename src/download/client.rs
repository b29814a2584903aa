//! HTTP implementation of the [`Fetcher`] contract.
//!
//! Requests go through the [`Session`] handed in by the access controller so
//! cookies and authentication material are shared across attempts. Status
//! codes that mean "you are not allowed" are reported as
//! [`DownloadError::AccessDenied`]; everything else keeps its own variant.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::cookie::Jar;
use reqwest::header::{
    CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderName, LAST_MODIFIED,
};
use reqwest::{Client, Method, Response};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};
use url::Url;

use super::error::DownloadError;
use super::fetcher::{DownloadDetails, FetchBody, Fetcher, UrlInfo};
use super::filename::{
    extension_from_content_type, parse_content_disposition, sanitize_filename,
    suggested_filename_from_url,
};
use super::progress::ProgressSink;
use crate::session::Session;
use crate::user_agent;

/// Known binary file extensions that indicate the server should NOT return HTML.
const BINARY_EXTENSIONS: &[&str] = &[
    ".pdf", ".zip", ".tar", ".tar.gz", ".tgz", ".gz", ".bz2", ".xz", ".bin", ".nii", ".h5",
    ".hdf5", ".mat", ".npy", ".parquet", ".doc", ".docx", ".xls", ".xlsx",
];

/// Common URL patterns indicating a login/SSO redirect.
const LOGIN_PATTERNS: &[&str] = &[
    "/login",
    "/signin",
    "/sign-in",
    "/auth/",
    "/sso",
    "/cas/login",
    "/saml",
    "/oauth",
    "/openid",
    "/idp/",
];

/// Fetches resources over HTTP and HTTPS.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpFetcher;

impl HttpFetcher {
    /// Creates an HTTP fetcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(level = "debug", skip(self, session), fields(origin = %session.origin()))]
    async fn download_details(
        &self,
        url: &str,
        session: &Session,
    ) -> Result<DownloadDetails, DownloadError> {
        let parsed_url = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let response = send_request(session, Method::GET, url).await?;

        let expected_size = content_length(&response);
        let suggested_filename = extract_filename(&response, &parsed_url);
        debug!(
            expected_size = ?expected_size,
            filename = %suggested_filename,
            "resolved download details"
        );

        Ok(DownloadDetails {
            body: Box::new(HttpBody {
                url: url.to_string(),
                response,
            }),
            expected_size,
            suggested_filename,
        })
    }

    #[instrument(level = "debug", skip(self, session), fields(origin = %session.origin()))]
    async fn check(&self, url: &str, session: &Session) -> Result<UrlInfo, DownloadError> {
        let parsed_url = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let response = send_request(session, Method::HEAD, url).await?;

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Ok(UrlInfo {
            url: url.to_string(),
            final_url: response.url().to_string(),
            status: response.status().as_u16(),
            size: content_length(&response),
            content_type: header(CONTENT_TYPE),
            filename: extract_filename(&response, &parsed_url),
            last_modified: header(LAST_MODIFIED),
        })
    }
}

/// Streaming response body.
struct HttpBody {
    url: String,
    response: Response,
}

#[async_trait]
impl FetchBody for HttpBody {
    async fn write_to(
        self: Box<Self>,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
        progress: &dyn ProgressSink,
    ) -> Result<u64, DownloadError> {
        let Self { url, response } = *self;
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| classify_transport_error(&url, e))?;
            sink.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::write(url.clone(), e))?;
            bytes_written += chunk.len() as u64;
            progress.update(bytes_written);
        }

        sink.flush()
            .await
            .map_err(|e| DownloadError::write(url.clone(), e))?;

        Ok(bytes_written)
    }
}

/// Builds a reqwest client with the crate's timeouts and User-Agent.
pub(crate) fn build_client(
    cookie_jar: Arc<Jar>,
    connect_timeout_secs: u64,
    read_timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
        .cookie_provider(cookie_jar)
        .build()
}

async fn send_request(
    session: &Session,
    method: Method,
    url: &str,
) -> Result<Response, DownloadError> {
    let is_get = method == Method::GET;
    let response = session
        .request(method, url)
        .send()
        .await
        .map_err(|e| classify_transport_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        let status_code = status.as_u16();
        if matches!(status_code, 401 | 403 | 407) {
            debug!(url = %url, status = status_code, "access denied by server");
            return Err(DownloadError::access_denied(url, status_code));
        }
        return Err(DownloadError::http_status(url, status_code));
    }

    if is_get && is_login_redirect(url, &response) {
        return Err(DownloadError::access_denied(url, 0));
    }

    Ok(response)
}

fn classify_transport_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Extracts filename from Content-Disposition header or URL path.
fn extract_filename(response: &Response, url: &Url) -> String {
    if let Some(cd) = response.headers().get(CONTENT_DISPOSITION)
        && let Ok(cd_str) = cd.to_str()
        && let Some(filename) = parse_content_disposition(cd_str)
    {
        return sanitize_filename(&filename);
    }

    let extension = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .map_or(".bin", extension_from_content_type);
    suggested_filename_from_url(url, extension)
}

/// Returns true if the URL path ends in a known binary extension.
fn is_expected_binary(url: &str) -> bool {
    let path = Url::parse(url)
        .ok()
        .map(|u| u.path().to_lowercase())
        .unwrap_or_default();
    BINARY_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// HTML answer for an expected binary after landing on a login/SSO URL.
fn is_login_redirect(original_url: &str, response: &Response) -> bool {
    if !is_expected_binary(original_url) {
        return false;
    }

    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
    if !is_html {
        return false;
    }

    // Without a login pattern it may be a server error page, not auth.
    let response_url = response.url().as_str().to_lowercase();
    let has_login_pattern = LOGIN_PATTERNS
        .iter()
        .any(|pattern| response_url.contains(pattern));

    debug!(
        url = %original_url,
        response_url = %response_url,
        has_login_pattern,
        "HTML response for expected binary download"
    );
    has_login_pattern
}

//! Filename extraction, sanitization, and destination path resolution.
//!
//! Protocol fetchers use the `suggested_*` helpers to name a resource; the
//! engine uses [`resolve_final_path`] and [`temp_path_for`] to decide where the
//! bytes land.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use url::Url;

use super::constants::TEMP_DOWNLOAD_SUFFIX;

/// Resolves where a download is published.
///
/// - `destination` is an existing directory: `destination/suggested`
/// - `destination` is absent: `suggested` under `base_dir` (or relative to the
///   current directory when no base is configured)
/// - otherwise `destination` verbatim
#[must_use]
pub fn resolve_final_path(
    destination: Option<&Path>,
    suggested_filename: &str,
    base_dir: Option<&Path>,
) -> PathBuf {
    let filename = safe_leaf_name(suggested_filename);
    match destination {
        Some(dir) if dir.is_dir() => dir.join(filename),
        Some(path) => path.to_path_buf(),
        None => base_dir.map_or_else(|| PathBuf::from(&filename), |base| base.join(&filename)),
    }
}

/// Returns the temporary path a download into `final_path` is staged at.
///
/// Deterministic so a crashed download leaves a discoverable artifact.
#[must_use]
pub fn temp_path_for(final_path: &Path) -> PathBuf {
    let mut name: OsString = final_path.as_os_str().to_owned();
    name.push(TEMP_DOWNLOAD_SUFFIX);
    PathBuf::from(name)
}

/// Suggested filename from the URL's last path segment, or a timestamped fallback.
#[must_use]
pub fn suggested_filename_from_url(url: &Url, fallback_extension: &str) -> String {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode(last).unwrap_or_else(|e| {
            debug!(
                segment = %last,
                error = %e,
                "URL decoding failed, using raw segment"
            );
            last.into()
        });
        return sanitize_filename(&decoded);
    }

    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("download_{timestamp}{fallback_extension}")
}

/// Guess file extension from Content-Type header.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    match mime.as_str() {
        "text/html" => ".html",
        "text/plain" => ".txt",
        "text/csv" => ".csv",
        "application/json" => ".json",
        "application/xml" | "text/xml" => ".xml",
        "application/pdf" => ".pdf",
        "image/jpeg" => ".jpg",
        "image/png" => ".png",
        "application/zip" => ".zip",
        "application/gzip" => ".gz",
        "application/x-tar" => ".tar",
        _ => ".bin",
    }
}

/// Parses Content-Disposition header to extract filename.
///
/// Handles both:
/// - `attachment; filename="example.pdf"`
/// - `attachment; filename=example.pdf`
/// - `attachment; filename*=UTF-8''example.pdf` (RFC 5987)
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    // RFC 5987 form wins when both are present
    if let Some(pos) = header.find("filename*=") {
        let value = header[pos + 10..].trim();
        if let Some(quote_pos) = value.find("''") {
            let encoded = &value[quote_pos + 2..];
            let end = encoded.find(';').unwrap_or(encoded.len());
            if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
                return Some(decoded.into_owned());
            }
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();
        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

/// Sanitizes filename for filesystem safety.
///
/// Replaces characters that are invalid on common filesystems:
/// / \ : * ? " < > |
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if sanitized.is_empty() {
        return "_".to_string();
    }

    if is_safe_filename_segment(&sanitized) {
        sanitized
    } else {
        sanitized
            .chars()
            .map(|c| if c == '.' { '_' } else { c })
            .collect()
    }
}

/// Final guard before joining a suggested name onto a directory.
fn safe_leaf_name(suggested: &str) -> String {
    let sanitized = sanitize_filename(suggested);
    if sanitized.trim_matches('_').is_empty() {
        "download.bin".to_string()
    } else {
        sanitized
    }
}

fn is_safe_filename_segment(name: &str) -> bool {
    !Path::new(name).components().any(|component| {
        matches!(
            component,
            Component::CurDir | Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    })
}

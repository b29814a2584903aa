//! Constants for the download module (timeouts, access loop guard, temp files).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Hard cap on access attempts for one operation.
///
/// The decision procedure never needs more than a handful; hitting this is a bug.
pub const MAX_ACCESS_ATTEMPTS: u32 = 20;

/// Bodies smaller than this are inspected for in-band authentication failures.
///
/// Login and error pages are short; real payloads past this size are not scanned.
pub const AUTH_FAILURE_SCAN_LIMIT: u64 = 10_000;

/// Suffix appended to the final path to name the temporary download file.
pub const TEMP_DOWNLOAD_SUFFIX: &str = ".authdl-download-temp";

/// Delay between attempts to lock a temporary file held by another download.
pub const TEMP_LOCK_POLL_INTERVAL_MS: u64 = 50;

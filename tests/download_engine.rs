//! Integration tests for the atomic download pipeline.
//!
//! A scripted fetcher stands in for the protocol so these tests cover path
//! resolution, temporary files, integrity checks and publishing only.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use authdl_core::auth::{AuthRequirement, Credential, UserPassword};
use authdl_core::download::filename::temp_path_for;
use authdl_core::download::{DownloadError, Downloader};
use tempfile::TempDir;

mod support;
use support::fakes::{
    CountingAuthenticator, Outcome, RecordingSessions, ScriptedFetcher, ScriptedPrompter,
};

const URL: &str = "http://example.org/data.bin";

fn downloader(fetcher: &Arc<ScriptedFetcher>, base_dir: &Path) -> Downloader {
    Downloader::new(fetcher.clone(), Arc::new(RecordingSessions::default()))
        .with_prompter(Arc::new(ScriptedPrompter::declining()))
        .with_base_dir(base_dir)
}

fn sized(content: &[u8], expected: u64, filename: &str) -> Outcome {
    Outcome::Serve {
        content: content.to_vec(),
        expected_size: Some(expected),
        filename: filename.to_string(),
    }
}

fn leftover_temp_files(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.to_string_lossy().ends_with(".authdl-download-temp"))
        .collect()
}

#[tokio::test]
async fn test_download_without_destination_publishes_suggested_filename() {
    let dir = TempDir::new().unwrap();
    let content = vec![7u8; 100];
    let fetcher = Arc::new(ScriptedFetcher::always(sized(&content, 100, "data.bin")));

    let path = downloader(&fetcher, dir.path())
        .download(URL, None, false)
        .await
        .unwrap();

    assert_eq!(path, dir.path().join("data.bin"));
    assert_eq!(std::fs::read(&path).unwrap(), content);
    assert!(!temp_path_for(&path).exists());
    assert!(leftover_temp_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_short_transfer_reports_both_sizes_and_publishes_nothing() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(sized(&[1u8; 80], 100, "data.bin")));

    let error = downloader(&fetcher, dir.path())
        .download(URL, None, false)
        .await
        .unwrap_err();

    let message = error.to_string();
    assert!(matches!(error, DownloadError::Integrity { .. }), "{error:?}");
    assert!(message.contains("80"), "{message}");
    assert!(message.contains("100"), "{message}");
    assert!(!dir.path().join("data.bin").exists());
    assert!(leftover_temp_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_zero_expected_size_is_checked() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(sized(b"surprise", 0, "empty.txt")));

    let error = downloader(&fetcher, dir.path())
        .download(URL, None, false)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        DownloadError::Integrity {
            expected_bytes: 0,
            actual_bytes: 8,
            ..
        }
    ));
    assert!(!dir.path().join("empty.txt").exists());
}

#[tokio::test]
async fn test_empty_body_with_zero_expected_size_succeeds() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(sized(b"", 0, "empty.txt")));

    let path = downloader(&fetcher, dir.path())
        .download(URL, None, false)
        .await
        .unwrap();

    assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
}

#[tokio::test]
async fn test_directory_destination_appends_suggested_filename() {
    let dir = TempDir::new().unwrap();
    let outdir = dir.path().join("outdir");
    std::fs::create_dir(&outdir).unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::serve(
        b"a,b\n1,2\n",
        "report.csv",
    )));

    let path = downloader(&fetcher, dir.path())
        .download("http://example.org/export?id=4", Some(&outdir), false)
        .await
        .unwrap();

    assert_eq!(path, outdir.join("report.csv"));
    assert_eq!(std::fs::read(&path).unwrap(), b"a,b\n1,2\n");
}

#[tokio::test]
async fn test_file_destination_is_used_verbatim() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("renamed.bin");
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::serve(b"xyz", "data.bin")));

    let path = downloader(&fetcher, dir.path())
        .download(URL, Some(&target), false)
        .await
        .unwrap();

    assert_eq!(path, target);
    assert!(!dir.path().join("data.bin").exists());
}

#[tokio::test]
async fn test_existing_file_destination_fails_before_any_fetch() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("data.bin");
    std::fs::write(&target, b"original").unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::serve(b"new", "data.bin")));

    let error = downloader(&fetcher, dir.path())
        .download(URL, Some(&target), false)
        .await
        .unwrap_err();

    assert!(
        matches!(&error, DownloadError::AlreadyExists { path } if path == &target),
        "{error:?}"
    );
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(std::fs::read(&target).unwrap(), b"original");
}

#[tokio::test]
async fn test_existing_suggested_file_is_not_replaced_without_overwrite() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("data.bin"), b"original").unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::serve(b"new", "data.bin")));

    let error = downloader(&fetcher, dir.path())
        .download(URL, None, false)
        .await
        .unwrap_err();

    assert!(matches!(error, DownloadError::AlreadyExists { .. }));
    assert_eq!(
        std::fs::read(dir.path().join("data.bin")).unwrap(),
        b"original"
    );
    assert!(leftover_temp_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_overwrite_replaces_existing_file() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("data.bin");
    std::fs::write(&target, b"original").unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::serve(b"new", "data.bin")));

    let path = downloader(&fetcher, dir.path())
        .download(URL, Some(&target), true)
        .await
        .unwrap();

    assert_eq!(std::fs::read(path).unwrap(), b"new");
}

#[tokio::test]
async fn test_failed_overwrite_keeps_previous_content() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("data.bin");
    std::fs::write(&target, b"original").unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(sized(b"short", 100, "data.bin")));

    let error = downloader(&fetcher, dir.path())
        .download(URL, Some(&target), true)
        .await
        .unwrap_err();

    assert!(matches!(error, DownloadError::Integrity { .. }));
    assert_eq!(std::fs::read(&target).unwrap(), b"original");
    assert!(leftover_temp_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_broken_transfer_is_wrapped_with_context_and_cleaned_up() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::BreakMidBody {
        partial: b"half".to_vec(),
    }));

    let error = downloader(&fetcher, dir.path())
        .download(URL, None, false)
        .await
        .unwrap_err();

    match error {
        DownloadError::Transfer { url, path, source } => {
            assert_eq!(url, URL);
            assert_eq!(path, dir.path().join("broken.bin"));
            assert!(matches!(*source, DownloadError::Timeout { .. }));
        }
        other => panic!("expected a wrapped transfer error, got {other:?}"),
    }
    assert!(!dir.path().join("broken.bin").exists());
    assert!(leftover_temp_files(dir.path()).is_empty());
    // Non-denial failures are not retried.
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn test_stale_temp_file_is_overwritten() {
    let dir = TempDir::new().unwrap();
    let final_path = dir.path().join("data.bin");
    std::fs::write(temp_path_for(&final_path), vec![0u8; 4096]).unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::serve(b"fresh", "data.bin")));

    let path = downloader(&fetcher, dir.path())
        .download(URL, None, false)
        .await
        .unwrap();

    assert_eq!(std::fs::read(path).unwrap(), b"fresh");
    assert!(leftover_temp_files(dir.path()).is_empty());
}

fn detecting_downloader(fetcher: &Arc<ScriptedFetcher>, base_dir: &Path) -> Downloader {
    let credential: Arc<dyn Credential> = Arc::new(UserPassword::new("example", "alice", "pw"));
    Downloader::new(fetcher.clone(), Arc::new(RecordingSessions::default()))
        .with_base_dir(base_dir)
        .with_authenticator(
            Arc::new(CountingAuthenticator::detecting(
                AuthRequirement::Required,
                &["Invalid username or password", "Please log ?in"],
            )),
            Some(credential),
        )
        .unwrap()
}

#[tokio::test]
async fn test_small_login_page_body_is_detected_as_auth_failure() {
    let dir = TempDir::new().unwrap();
    let page = b"<html><body>Please login to continue</body></html>";
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::serve(page, "data.bin")));

    let error = detecting_downloader(&fetcher, dir.path())
        .download(URL, None, false)
        .await
        .unwrap_err();

    match &error {
        DownloadError::AuthFailureDetected {
            url, description, ..
        } => {
            assert_eq!(url, URL);
            assert!(description.contains("Please login"), "{description}");
        }
        other => panic!("expected auth failure detection, got {other:?}"),
    }
    assert!(!dir.path().join("data.bin").exists());
    assert!(leftover_temp_files(dir.path()).is_empty());
}

#[tokio::test]
async fn test_large_bodies_are_not_scanned_for_auth_failures() {
    let dir = TempDir::new().unwrap();
    let mut body = b"Please login".to_vec();
    body.resize(10_000, b'.');
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::serve(&body, "data.bin")));

    let path = detecting_downloader(&fetcher, dir.path())
        .download(URL, None, false)
        .await
        .unwrap();

    assert_eq!(std::fs::metadata(path).unwrap().len(), 10_000);
}

#[tokio::test]
async fn test_fetch_bytes_detects_auth_failure_without_touching_disk() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::serve(
        b"Invalid username or password",
        "data.bin",
    )));

    let error = detecting_downloader(&fetcher, dir.path())
        .fetch_bytes(URL)
        .await
        .unwrap_err();

    assert!(matches!(error, DownloadError::AuthFailureDetected { .. }));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_fetch_bytes_checks_expected_size() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(sized(&[1u8; 80], 100, "data.bin")));

    let error = downloader(&fetcher, dir.path())
        .fetch_bytes(URL)
        .await
        .unwrap_err();

    assert!(error.to_string().contains("memory"), "{error}");
    assert!(matches!(
        error,
        DownloadError::Integrity {
            expected_bytes: 100,
            actual_bytes: 80,
            ..
        }
    ));
}

#[tokio::test]
async fn test_access_denied_during_download_propagates_unwrapped_for_retry() {
    let dir = TempDir::new().unwrap();
    let fetcher = Arc::new(ScriptedFetcher::always(Outcome::Deny));

    let error = downloader(&fetcher, dir.path())
        .download(URL, None, false)
        .await
        .unwrap_err();

    // No authenticator: requirement unknown, so the denial ends as unconfigured.
    assert!(matches!(error, DownloadError::UnconfiguredProvider { .. }));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unflushed_body_is_measured_completely() {
    let dir = TempDir::new().unwrap();
    let content = vec![7u8; 100];
    let fetcher = Arc::new(ScriptedFetcher::always(sized(&content, 100, "data.bin")));
    let downloader = downloader(&fetcher, dir.path());

    for _ in 0..50 {
        let path = downloader.download(URL, None, true).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), content);
    }
    assert!(leftover_temp_files(dir.path()).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_downloads_to_one_path_leave_one_whole_body() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("shared.bin");
    let short = vec![1u8; 40];
    let long = vec![2u8; 4000];
    let first = Arc::new(ScriptedFetcher::always(sized(&short, 40, "shared.bin")));
    let second = Arc::new(ScriptedFetcher::always(sized(&long, 4000, "shared.bin")));
    let first = downloader(&first, dir.path());
    let second = downloader(&second, dir.path());

    for _ in 0..25 {
        let (a, b) = tokio::join!(
            first.download(URL, Some(&target), true),
            second.download(URL, Some(&target), true),
        );
        assert_eq!(a.unwrap(), target);
        assert_eq!(b.unwrap(), target);

        let published = std::fs::read(&target).unwrap();
        assert!(
            published == short || published == long,
            "torn publish of {} bytes",
            published.len()
        );
        assert!(leftover_temp_files(dir.path()).is_empty());
    }
}

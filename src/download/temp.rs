//! Scoped ownership of a temporary download file.
//!
//! A [`TempDownload`] is staged next to the final path (see
//! [`temp_path_for`]), holds an exclusive advisory lock from acquisition
//! until it is published or dropped, and removes the file when dropped unless
//! it was published with [`TempDownload::persist`].
//!
//! Downloads into the same destination share one temporary path, so they take
//! turns: a second writer waits for the lock, and whichever publishes last
//! wins at the final rename.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use tracing::{debug, info, warn};

use super::DownloadError;
use super::constants::TEMP_LOCK_POLL_INTERVAL_MS;
use super::filename::temp_path_for;

/// Exclusive handle on the temporary file for one download attempt.
#[derive(Debug)]
pub struct TempDownload {
    path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
    persisted: bool,
}

impl TempDownload {
    /// Creates (or takes over a stale) temporary file for `final_path`.
    ///
    /// Waits while another download into the same destination holds the
    /// temporary file.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] when the temporary file cannot be opened
    /// or locked.
    pub async fn acquire(final_path: &Path) -> Result<Self, DownloadError> {
        let path = temp_path_for(final_path);
        let mut waiting = false;

        loop {
            let existed = path.exists();
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| DownloadError::io(path.clone(), e))?;

            if let Err(error) = file.try_lock_exclusive() {
                if !is_lock_contended(&error) {
                    return Err(DownloadError::io(path, error));
                }
                if !waiting {
                    info!(
                        path = %final_path.display(),
                        "Another download into this destination is running; waiting for it"
                    );
                    waiting = true;
                }
                drop(file);
                tokio::time::sleep(Duration::from_millis(TEMP_LOCK_POLL_INTERVAL_MS)).await;
                continue;
            }

            // The previous holder may have published or removed the file we
            // locked; only the file currently at `path` may be reused.
            if !is_same_file(&file, &path).map_err(|e| DownloadError::io(path.clone(), e))? {
                drop(file);
                continue;
            }

            if existed && !waiting {
                warn!(
                    path = %path.display(),
                    "Temporary file from a previous download was found; it will be overwritten"
                );
            }
            file.set_len(0)
                .map_err(|e| DownloadError::io(path.clone(), e))?;

            return Ok(Self {
                path,
                final_path: final_path.to_path_buf(),
                file: Some(file),
                persisted: false,
            });
        }
    }

    /// Path of the temporary file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens an async writer positioned at the start of the temporary file.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the handle cannot be duplicated.
    pub fn writer(&self) -> Result<tokio::fs::File, DownloadError> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| DownloadError::io(self.path.clone(), ErrorKind::NotFound.into()))?;
        let clone = file
            .try_clone()
            .map_err(|e| DownloadError::io(self.path.clone(), e))?;
        Ok(tokio::fs::File::from_std(clone))
    }

    /// Current size of the temporary file in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the file cannot be inspected.
    pub fn size(&self) -> Result<u64, DownloadError> {
        std::fs::metadata(&self.path)
            .map(|meta| meta.len())
            .map_err(|e| DownloadError::io(self.path.clone(), e))
    }

    /// Reads the temporary file back, lossily decoded as text.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the file cannot be read.
    pub async fn read_text(&self) -> Result<String, DownloadError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| DownloadError::io(self.path.clone(), e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Publishes the temporary file at the final path with a single rename.
    ///
    /// The lock is held across the rename, so no other writer can truncate
    /// the file between the last check and its publication.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Io`] if the rename fails; the temporary file is
    /// then removed on drop.
    pub fn persist(mut self) -> Result<PathBuf, DownloadError> {
        // Windows refuses to rename a file that is still open.
        #[cfg(windows)]
        drop(self.file.take());

        std::fs::rename(&self.path, &self.final_path)
            .map_err(|e| DownloadError::io(self.final_path.clone(), e))?;
        self.persisted = true;
        drop(self.file.take());
        debug!(
            from = %self.path.display(),
            to = %self.final_path.display(),
            "published download"
        );
        Ok(self.final_path.clone())
    }
}

impl Drop for TempDownload {
    fn drop(&mut self) {
        // After a rename the temp path may already belong to the next writer.
        if self.persisted {
            return;
        }
        // Unlink while still locked so a waiting writer never adopts this file.
        if self.path.exists() {
            debug!(path = %self.path.display(), "Removing a temporary download");
            if let Err(error) = std::fs::remove_file(&self.path) {
                warn!(path = %self.path.display(), error = %error, "failed to remove temporary download");
            }
        }
        drop(self.file.take());
    }
}

fn is_lock_contended(error: &std::io::Error) -> bool {
    error.kind() == ErrorKind::WouldBlock
        || error.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Whether `file` is still the file linked at `path`.
#[cfg(unix)]
fn is_same_file(file: &File, path: &Path) -> std::io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match std::fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
        Err(error) => Err(error),
    }
}

#[cfg(not(unix))]
fn is_same_file(_file: &File, path: &Path) -> std::io::Result<bool> {
    Ok(path.exists())
}

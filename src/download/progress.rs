//! Progress reporting for byte transfers.
//!
//! The engine hands a [`ProgressSink`] to the protocol fetch, which reports the
//! running byte count; the engine calls [`ProgressSink::finish`] once the body
//! has been written.

use std::fmt;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Receives byte-count updates during a transfer.
pub trait ProgressSink: Send + Sync {
    /// Reports the total number of bytes transferred so far.
    fn update(&self, bytes_so_far: u64);

    /// Marks the transfer as complete.
    fn finish(&self);
}

/// Discards all progress updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn update(&self, _bytes_so_far: u64) {}

    fn finish(&self) {}
}

/// Creates progress sinks for individual transfers.
pub trait ProgressFactory: Send + Sync {
    /// Starts a sink for `url` being written to `target` (`None` for in-memory fetches).
    fn start(&self, url: &str, target: Option<&str>, total: Option<u64>) -> Box<dyn ProgressSink>;
}

impl fmt::Debug for dyn ProgressFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ProgressFactory")
    }
}

/// Factory producing [`NoProgress`] sinks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressFactory for SilentProgress {
    fn start(
        &self,
        _url: &str,
        _target: Option<&str>,
        _total: Option<u64>,
    ) -> Box<dyn ProgressSink> {
        Box::new(NoProgress)
    }
}

/// Terminal progress bar on stderr.
#[derive(Debug)]
pub struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    /// Creates a bar labelled with the URL; spinner when the size is unknown.
    #[must_use]
    pub fn new(url: &str, target: Option<&str>, total: Option<u64>) -> Self {
        let bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                if let Ok(style) = ProgressStyle::with_template(
                    "{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
                ) {
                    bar.set_style(style.progress_chars("=> "));
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} {bytes}") {
                    bar.set_style(style);
                }
                bar.enable_steady_tick(Duration::from_millis(120));
                bar
            }
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        bar.set_message(target.map_or_else(|| url.to_string(), str::to_string));
        Self { bar }
    }
}

impl ProgressSink for ProgressBarSink {
    fn update(&self, bytes_so_far: u64) {
        self.bar.set_position(bytes_so_far);
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Factory producing [`ProgressBarSink`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalProgress;

impl ProgressFactory for TerminalProgress {
    fn start(&self, url: &str, target: Option<&str>, total: Option<u64>) -> Box<dyn ProgressSink> {
        Box::new(ProgressBarSink::new(url, target, total))
    }
}

//! Progress reporting for transfers.
//!

use crate::error::Error::ParseError;
use crate::error::Result;
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Receives progress after each chunk is written. Reporting is best-effort and never fails a
/// transfer.
pub trait ProgressSink {
    /// Report that `written` bytes out of `total` have reached the destination.
    fn report(&self, written: u64, total: u64);
}

/// Format progress using binary prefixes, e.g. `128.00 MiB of 4.50 GiB`.
pub fn format_progress(written: u64, total: u64) -> String {
    format!("{} of {}", HumanBytes(written), HumanBytes(total))
}

/// The default percentage of the object between progress log lines.
pub const DEFAULT_LOG_STEP: u64 = 10;

/// Report progress as log lines, at most one per `step` percent of the object.
#[derive(Debug)]
pub struct LogProgress {
    step: u64,
    next: AtomicU64,
}

impl Default for LogProgress {
    fn default() -> Self {
        Self::with_step(DEFAULT_LOG_STEP)
    }
}

impl LogProgress {
    /// Log every `step` percent, clamped to between 1 and 100.
    pub fn with_step(step: u64) -> Self {
        Self {
            step: step.clamp(1, 100),
            next: AtomicU64::new(0),
        }
    }

    /// Whether this report crosses into a step that has not been logged yet.
    fn should_log(&self, written: u64, total: u64) -> bool {
        if total == 0 {
            return false;
        }

        let percent = (u128::from(written) * 100 / u128::from(total)).min(100) as u64;
        let step = percent / self.step;
        self.next.fetch_max(step + 1, Ordering::Relaxed) <= step
    }
}

impl ProgressSink for LogProgress {
    fn report(&self, written: u64, total: u64) {
        if self.should_log(written, total) {
            info!("transferred {}", format_progress(written, total));
        }
    }
}

/// Report progress with a terminal progress bar.
#[derive(Debug, Clone)]
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    /// Create a progress bar. Its length is set by the first report.
    pub fn new() -> Result<Self> {
        let style = ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] [{bar:40}] {bytes} of {total_bytes} ({bytes_per_sec}, {eta})",
        )
        .map_err(|err| ParseError(err.to_string()))?;

        Ok(Self {
            bar: ProgressBar::new(0).with_style(style),
        })
    }
}

impl ProgressSink for BarProgress {
    fn report(&self, written: u64, total: u64) {
        self.bar.set_length(total);
        self.bar.set_position(written);
        if written >= total {
            self.bar.finish();
        }
    }
}

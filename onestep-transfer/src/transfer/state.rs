//! State shared between the range reader and the uploader.
//!

use crate::error::{Error, ErrorKind, Result};
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// The pipeline error state. Holds the first upload error, set at most once and never cleared,
/// and whether the reader gave up before producing every range.
#[derive(Debug, Default)]
pub struct PipelineState {
    error: Mutex<Option<Error>>,
    failed: AtomicBool,
    download_aborted: AtomicBool,
}

impl PipelineState {
    /// Record an upload error. Only the first error is kept, returns whether this one was.
    pub fn fail(&self, err: Error) -> bool {
        let mut error = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        if error.is_some() {
            return false;
        }

        *error = Some(err);
        self.failed.store(true, Ordering::Release);
        true
    }

    /// Non-blocking check for a recorded upload error.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Take the recorded upload error out of the state.
    pub fn take_error(&self) -> Option<Error> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Mark that the reader stopped before emitting every range.
    pub fn abort_download(&self) {
        self.download_aborted.store(true, Ordering::Release);
    }

    /// Whether the reader stopped before emitting every range.
    pub fn download_aborted(&self) -> bool {
        self.download_aborted.load(Ordering::Acquire)
    }
}

/// The lifecycle of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Idle,
    Running,
    Succeeded,
    Failed(ErrorKind),
}

impl TransferState {
    /// The terminal state for a transfer result.
    pub fn from_result<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => TransferState::Succeeded,
            Err(err) => TransferState::Failed(err.kind().unwrap_or(ErrorKind::Upload)),
        }
    }
}

impl Display for TransferState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferState::Idle => f.write_str("idle"),
            TransferState::Running => f.write_str("running"),
            TransferState::Succeeded => f.write_str("succeeded"),
            TransferState::Failed(ErrorKind::Download) => f.write_str("failed (download)"),
            TransferState::Failed(ErrorKind::Upload) => f.write_str("failed (upload)"),
            TransferState::Failed(ErrorKind::Timeout) => f.write_str("failed (timeout)"),
            TransferState::Failed(ErrorKind::Config) => f.write_str("failed (config)"),
        }
    }
}

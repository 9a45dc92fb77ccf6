//! The range reader, which downloads consecutive ranges of the source and hands them to the
//! relay channel in order.
//!

use crate::error::Error::{ConcurrencyError, DownloadError, TimeoutError};
use crate::error::Result;
use crate::io::source::ObjectSource;
use crate::transfer::range::{ranges, ByteRange};
use crate::transfer::retry::RetryPolicy;
use crate::transfer::state::PipelineState;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A downloaded range. Holds one of the in-flight permits until it is dropped by the uploader.
#[derive(Debug)]
pub struct Chunk {
    range: ByteRange,
    data: Bytes,
    _permit: OwnedSemaphorePermit,
}

impl Chunk {
    /// Create a new chunk.
    pub fn new(range: ByteRange, data: Bytes, permit: OwnedSemaphorePermit) -> Self {
        Self {
            range,
            data,
            _permit: permit,
        }
    }

    /// The range this chunk covers.
    pub fn range(&self) -> ByteRange {
        self.range
    }

    /// The chunk bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Output of the reader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReadSummary {
    pub ranges: u64,
    pub retries: u64,
}

/// Issues sequential ranged reads against the source.
pub struct RangeReader<'a> {
    source: &'a (dyn ObjectSource + Send + Sync),
    total_size: u64,
    chunk_size: u64,
    retry: &'a RetryPolicy,
    cancel: &'a CancellationToken,
    state: Arc<PipelineState>,
    permits: Arc<Semaphore>,
}

impl<'a> RangeReader<'a> {
    /// Create a new range reader.
    pub fn new(
        source: &'a (dyn ObjectSource + Send + Sync),
        total_size: u64,
        chunk_size: u64,
        retry: &'a RetryPolicy,
        cancel: &'a CancellationToken,
        state: Arc<PipelineState>,
        permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            source,
            total_size,
            chunk_size,
            retry,
            cancel,
            state,
            permits,
        }
    }

    /// Read every range into the channel. The channel is closed when this returns, and the
    /// pipeline state is marked as aborted first if reading failed.
    pub async fn run(self, tx: Sender<Chunk>) -> Result<ReadSummary> {
        let result = self.read_ranges(&tx).await;
        if result.is_err() {
            self.state.abort_download();
        }

        drop(tx);
        result
    }

    async fn read_ranges(&self, tx: &Sender<Chunk>) -> Result<ReadSummary> {
        let mut summary = ReadSummary::default();

        for range in ranges(self.total_size, self.chunk_size) {
            let permit = self.permits.clone().acquire_owned().await?;

            if self.cancel.is_cancelled() {
                return Err(TimeoutError(format!(
                    "cancelled before reading range {} of {}",
                    range,
                    self.source.location()
                )));
            }
            // The uploader has already surfaced its error, so stop without one of our own.
            if self.state.has_failed() {
                debug!(%range, "upload failed, stopping downloads");
                self.state.abort_download();
                return Ok(summary);
            }

            let what = format!("reading range {} of {}", range, self.source.location());
            let fetched = self
                .retry
                .run(&what, self.cancel, || self.fetch(range))
                .await
                .map_err(|err| match err {
                    TimeoutError(_) => err,
                    err => DownloadError(format!(
                        "{what} failed after {} attempts: {err}",
                        self.retry.max_attempts()
                    )),
                })?;

            summary.ranges += 1;
            summary.retries += u64::from(fetched.retries);
            debug!(%range, retries = fetched.retries, "read range");

            tx.send(Chunk::new(range, fetched.value, permit))
                .await
                .map_err(|_| {
                    ConcurrencyError("relay channel closed before all ranges were sent".to_string())
                })?;
        }

        Ok(summary)
    }

    async fn fetch(&self, range: ByteRange) -> Result<Bytes> {
        let data = self.source.get_range(range).await?;
        if data.len() as u64 != range.len() {
            return Err(DownloadError(format!(
                "expected {} bytes for range {} but received {}",
                range.len(),
                range,
                data.len()
            )));
        }

        Ok(data)
    }
}

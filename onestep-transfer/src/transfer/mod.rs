//! The streaming transfer pipeline. A range reader downloads consecutive ranges of the source
//! into a bounded relay channel, and a single uploader appends them in order to the destination.
//!

pub mod progress;
pub mod range;
pub mod reader;
pub mod retry;
pub mod state;
pub mod uploader;

use crate::error::Error::{ConfigError, DownloadError, UploadError};
use crate::error::Result;
use crate::io::source::ObjectSource;
use crate::io::writer::ObjectWriter;
use crate::transfer::progress::{LogProgress, ProgressSink};
use crate::transfer::reader::{RangeReader, ReadSummary};
use crate::transfer::retry::RetryPolicy;
use crate::transfer::state::{PipelineState, TransferState};
use crate::transfer::uploader::{UploadSummary, Uploader};
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The default read chunk size. 64 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 67108864;

/// The default number of chunks in flight.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Encode a CRC32C the way object stores report it, base64 of the big-endian bytes.
pub fn encode_crc32c(crc32c: u32) -> String {
    BASE64_STANDARD.encode(crc32c.to_be_bytes())
}

/// Probe the source, validate the parameters and run the transfer.
pub async fn transfer_file(builder: TransferJobBuilder) -> Result<TransferStats> {
    builder.build().await?.run().await
}

/// Build a transfer job.
pub struct TransferJobBuilder {
    source: Option<Box<dyn ObjectSource + Send + Sync>>,
    writer: Option<Box<dyn ObjectWriter + Send>>,
    progress: Option<Box<dyn ProgressSink + Send + Sync>>,
    total_size: Option<u64>,
    chunk_size: u64,
    concurrency: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl Default for TransferJobBuilder {
    fn default() -> Self {
        Self {
            source: None,
            writer: None,
            progress: None,
            total_size: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            retry: Default::default(),
            cancel: Default::default(),
        }
    }
}

impl TransferJobBuilder {
    /// Set the source to read from.
    pub fn with_source(mut self, source: Box<dyn ObjectSource + Send + Sync>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the destination writer.
    pub fn with_writer(mut self, writer: Box<dyn ObjectWriter + Send>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Set the progress sink. Defaults to logging progress.
    pub fn with_progress(mut self, progress: Box<dyn ProgressSink + Send + Sync>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Use a known size instead of probing the source.
    pub fn with_total_size(mut self, total_size: u64) -> Self {
        self.total_size = Some(total_size);
        self
    }

    /// Set the read chunk size.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the maximum number of downloaded but not yet uploaded chunks.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Set the retry policy for range reads.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the cancellation signal.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validate the parameters and probe the source size if it was not set. A destination that
    /// was given is aborted and closed if the job cannot be built.
    pub async fn build(mut self) -> Result<TransferJob> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| ConfigError("a destination is required".to_string()))?;

        match self.prepare().await {
            Ok((source, total_size)) => {
                debug!(
                    state = %TransferState::Idle,
                    source = %source.location(),
                    destination = %writer.location(),
                    total_size,
                    "transfer job ready"
                );

                Ok(TransferJob {
                    source,
                    writer,
                    progress: self
                        .progress
                        .unwrap_or_else(|| Box::new(LogProgress::default())),
                    total_size,
                    chunk_size: self.chunk_size,
                    concurrency: self.concurrency,
                    retry: self.retry,
                    cancel: self.cancel,
                })
            }
            Err(err) => {
                warn!(error = %err, "not starting transfer to {}", writer.location());
                if let Err(abort_err) = writer.abort().await {
                    warn!(error = %abort_err, "failed to abort {}", writer.location());
                }
                if let Err(close_err) = writer.close().await {
                    warn!(error = %close_err, "failed to close {}", writer.location());
                }
                Err(err)
            }
        }
    }

    async fn prepare(&mut self) -> Result<(Box<dyn ObjectSource + Send + Sync>, u64)> {
        if self.chunk_size == 0 {
            return Err(ConfigError("chunk size must be greater than zero".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError("concurrency must be at least one".to_string()));
        }
        if self.concurrency > Semaphore::MAX_PERMITS {
            return Err(ConfigError(format!(
                "concurrency must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        let source = self
            .source
            .take()
            .ok_or_else(|| ConfigError("a source is required".to_string()))?;

        let total_size = match self.total_size {
            Some(total_size) => total_size,
            None => source.size().await.map_err(|err| match err {
                DownloadError(_) => err,
                err => DownloadError(format!(
                    "getting the size of {}: {}",
                    source.location(),
                    err
                )),
            })?,
        };
        if total_size == 0 {
            return Err(DownloadError(format!(
                "{} is empty or has an unknown size",
                source.location()
            )));
        }

        Ok((source, total_size))
    }
}

/// A single-use transfer of one object.
pub struct TransferJob {
    source: Box<dyn ObjectSource + Send + Sync>,
    writer: Box<dyn ObjectWriter + Send>,
    progress: Box<dyn ProgressSink + Send + Sync>,
    total_size: u64,
    chunk_size: u64,
    concurrency: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

/// Output statistics of a transfer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TransferStats {
    pub(crate) elapsed_seconds: f64,
    pub(crate) source: String,
    pub(crate) destination: String,
    pub(crate) bytes_transferred: u64,
    pub(crate) ranges: u64,
    pub(crate) retries: u64,
    pub(crate) crc32c: String,
}

impl TransferStats {
    /// The number of bytes written to the destination.
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    /// The number of ranges downloaded.
    pub fn ranges(&self) -> u64 {
        self.ranges
    }

    /// The number of range retries.
    pub fn retries(&self) -> u64 {
        self.retries
    }

    /// The base64 encoded CRC32C of the transferred data.
    pub fn crc32c(&self) -> &str {
        &self.crc32c
    }
}

impl TransferJob {
    /// The size of the source object.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Run the transfer to completion. The uploader runs as a separate task while the reader is
    /// driven from this one. The destination writer is closed exactly once on every path.
    pub async fn run(self) -> Result<TransferStats> {
        let TransferJob {
            source,
            writer,
            progress,
            total_size,
            chunk_size,
            concurrency,
            retry,
            cancel,
        } = self;

        let now = Instant::now();
        let source_location = source.location();
        let destination = writer.location();
        info!(
            state = %TransferState::Running,
            source = %source_location,
            %destination,
            total_size,
            chunk_size,
            concurrency,
            "starting transfer"
        );

        let state = Arc::new(PipelineState::default());
        let permits = Arc::new(Semaphore::new(concurrency));
        let (tx, rx) = mpsc::channel(concurrency);

        let upload = tokio::spawn(Uploader::new(writer, progress, state.clone(), total_size).run(rx));
        let read = RangeReader::new(
            source.as_ref(),
            total_size,
            chunk_size,
            &retry,
            &cancel,
            state.clone(),
            permits,
        )
        .run(tx)
        .await;
        let upload = upload.await;

        let result = Self::resolve(&state, total_size, read, upload).map(|(read, upload)| {
            TransferStats {
                elapsed_seconds: now.elapsed().as_secs_f64(),
                source: source_location,
                destination,
                bytes_transferred: upload.bytes_written,
                ranges: read.ranges,
                retries: read.retries,
                crc32c: encode_crc32c(upload.crc32c),
            }
        });

        let terminal = TransferState::from_result(&result);
        match &result {
            Ok(stats) => info!(
                state = %terminal,
                bytes = stats.bytes_transferred,
                retries = stats.retries,
                elapsed_seconds = stats.elapsed_seconds,
                "transfer finished"
            ),
            Err(err) => warn!(state = %terminal, error = %err, "transfer failed"),
        }

        result
    }

    /// Pick the terminal result. An upload error wins over a reader or timeout error.
    fn resolve(
        state: &PipelineState,
        total_size: u64,
        read: Result<ReadSummary>,
        upload: std::result::Result<UploadSummary, JoinError>,
    ) -> Result<(ReadSummary, UploadSummary)> {
        if let Some(err) = state.take_error() {
            return Err(err);
        }

        let upload = upload?;
        let read = read?;
        if upload.bytes_written != total_size {
            return Err(UploadError(format!(
                "wrote {} bytes but the source has {}",
                upload.bytes_written, total_size
            )));
        }

        Ok((read, upload))
    }
}

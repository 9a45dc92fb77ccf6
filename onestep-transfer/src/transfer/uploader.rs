//! The uploader, which drains chunks in order into the destination writer.
//!

use crate::error::Error::UploadError;
use crate::io::writer::ObjectWriter;
use crate::transfer::progress::ProgressSink;
use crate::transfer::reader::Chunk;
use crate::transfer::state::PipelineState;
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, warn};

/// Output of the uploader.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadSummary {
    pub bytes_written: u64,
    pub chunks: u64,
    pub crc32c: u32,
}

/// Single sequential consumer of the relay channel. Owns the destination writer and closes it
/// exactly once.
pub struct Uploader {
    writer: Box<dyn ObjectWriter + Send>,
    progress: Box<dyn ProgressSink + Send + Sync>,
    state: Arc<PipelineState>,
    total_size: u64,
}

impl Uploader {
    /// Create a new uploader.
    pub fn new(
        writer: Box<dyn ObjectWriter + Send>,
        progress: Box<dyn ProgressSink + Send + Sync>,
        state: Arc<PipelineState>,
        total_size: u64,
    ) -> Self {
        Self {
            writer,
            progress,
            state,
            total_size,
        }
    }

    /// Write chunks until the channel closes. Errors are recorded in the pipeline state rather
    /// than returned.
    pub async fn run(mut self, mut rx: Receiver<Chunk>) -> UploadSummary {
        let mut summary = UploadSummary::default();

        while let Some(chunk) = rx.recv().await {
            if self.state.download_aborted() {
                debug!(range = %chunk.range(), "download aborted, discarding chunk");
                break;
            }

            if let Err(err) = self.writer.write(chunk.data()).await {
                warn!(range = %chunk.range(), error = %err, "failed to write chunk");
                self.state.fail(UploadError(format!(
                    "writing range {} to {}: {}",
                    chunk.range(),
                    self.writer.location(),
                    err
                )));
                drop(chunk);

                self.finish(false).await;
                Self::discard(rx).await;
                return summary;
            }

            summary.bytes_written += chunk.data().len() as u64;
            summary.chunks += 1;
            summary.crc32c = crc32c::crc32c_append(summary.crc32c, chunk.data());
            self.progress.report(summary.bytes_written, self.total_size);
        }

        let commit = !self.state.download_aborted();
        self.finish(commit).await;
        Self::discard(rx).await;

        summary
    }

    /// Finalize the destination when `commit` is set, otherwise abort it. Either way the writer
    /// is closed once.
    async fn finish(&mut self, commit: bool) {
        if !commit {
            if let Err(err) = self.writer.abort().await {
                warn!(error = %err, "failed to abort {}", self.writer.location());
            }
        }

        if let Err(err) = self.writer.close().await {
            if commit {
                self.state.fail(UploadError(format!(
                    "closing {}: {}",
                    self.writer.location(),
                    err
                )));
            } else {
                warn!(error = %err, "failed to close {}", self.writer.location());
            }
        }
    }

    /// Drop any remaining chunks so the reader is never blocked on a full channel.
    async fn discard(mut rx: Receiver<Chunk>) {
        let mut discarded = 0;
        while rx.recv().await.is_some() {
            discarded += 1;
        }

        if discarded > 0 {
            debug!(discarded, "discarded chunks after the upload stopped");
        }
    }
}

//! Sequential writes to local files.
//!

use crate::error::Error::UploadError;
use crate::error::Result;
use crate::io::writer::ObjectWriter;
use crate::io::ObjectMeta;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// A file object. The file is created on the first write, and removed if the write is aborted.
#[derive(Debug)]
pub struct File {
    file: String,
    handle: Option<fs::File>,
    aborted: bool,
    closed: bool,
}

impl File {
    /// Create a new file.
    pub fn new(file: String) -> Self {
        Self {
            file,
            handle: None,
            aborted: false,
            closed: false,
        }
    }

    async fn handle(&mut self) -> Result<&mut fs::File> {
        if self.handle.is_none() {
            self.handle = Some(fs::File::create(&self.file).await?);
        }

        self.handle
            .as_mut()
            .ok_or_else(|| UploadError(format!("{} is not open", self.file)))
    }
}

impl ObjectMeta for File {
    fn location(&self) -> String {
        self.file.to_string()
    }
}

#[async_trait::async_trait]
impl ObjectWriter for File {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.aborted || self.closed {
            return Err(UploadError(format!("{} is no longer writable", self.file)));
        }

        self.handle().await?.write_all(data).await?;
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.aborted = true;
        if self.handle.take().is_some() {
            debug!(file = %self.file, "removing partially written file");
            fs::remove_file(&self.file).await?;
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(UploadError(format!("{} is already closed", self.file)));
        }
        self.closed = true;
        if self.aborted {
            return Ok(());
        }

        let handle = self.handle().await?;
        handle.flush().await?;
        handle.sync_all().await?;
        self.handle = None;

        Ok(())
    }
}

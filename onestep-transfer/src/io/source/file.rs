//! Ranged reads of local files.
//!

use crate::error::Result;
use crate::io::source::ObjectSource;
use crate::io::ObjectMeta;
use crate::transfer::range::ByteRange;
use bytes::Bytes;
use std::io::SeekFrom;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A file object.
#[derive(Debug, Clone)]
pub struct File {
    file: String,
}

impl File {
    /// Create a new file.
    pub fn new(file: String) -> Self {
        Self { file }
    }

    /// Get the size of the file.
    pub async fn file_size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.file).await?.len())
    }

    /// Read the range, stopping early at the end of the file.
    pub async fn read_range(&self, range: ByteRange) -> Result<Bytes> {
        let mut file = fs::File::open(&self.file).await?;
        file.seek(SeekFrom::Start(range.start())).await?;

        let mut buf = Vec::with_capacity(usize::try_from(range.len())?);
        file.take(range.len()).read_to_end(&mut buf).await?;

        Ok(buf.into())
    }
}

impl ObjectMeta for File {
    fn location(&self) -> String {
        self.file.to_string()
    }
}

#[async_trait::async_trait]
impl ObjectSource for File {
    async fn size(&self) -> Result<u64> {
        self.file_size().await
    }

    async fn get_range(&self, range: ByteRange) -> Result<Bytes> {
        self.read_range(range).await
    }
}

//! Sequential writes to S3 objects using multipart uploads.
//!

use crate::error::Error::{AwsError, ConfigError, UploadError};
use crate::error::Result;
use crate::io::writer::ObjectWriter;
use crate::io::{ObjectMeta, Provider};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use aws_smithy_types::byte_stream::ByteStream;
use tracing::debug;

/// The smallest part size S3 accepts for all but the last part. 5 MiB.
pub const MIN_PART_SIZE: u64 = 5242880;

/// The largest part size S3 accepts. 5 GiB.
pub const MAX_PART_SIZE: u64 = 5368709120;

/// The maximum number of parts in a multipart upload.
pub const MAX_PARTS: i32 = 10000;

/// An S3 object written in parts. Objects smaller than one part use a single `PutObject`.
#[derive(Debug)]
pub struct S3 {
    client: Client,
    bucket: String,
    key: String,
    part_size: usize,
    buffer: Vec<u8>,
    upload_id: Option<String>,
    completed_parts: Vec<CompletedPart>,
    aborted: bool,
    closed: bool,
}

impl S3 {
    /// Create a new S3 writer.
    pub fn new(client: Client, bucket: String, key: String, part_size: u64) -> Result<S3> {
        if !(MIN_PART_SIZE..=MAX_PART_SIZE).contains(&part_size) {
            return Err(ConfigError(format!(
                "part size must be between {} and {} bytes",
                MIN_PART_SIZE, MAX_PART_SIZE
            )));
        }

        Ok(Self {
            client,
            bucket,
            key,
            part_size: usize::try_from(part_size)?,
            buffer: Vec::new(),
            upload_id: None,
            completed_parts: Vec::new(),
            aborted: false,
            closed: false,
        })
    }

    /// Get the multipart upload, creating it if it is not in progress.
    async fn multipart_upload(&mut self) -> Result<String> {
        if let Some(upload_id) = &self.upload_id {
            return Ok(upload_id.to_string());
        }

        let upload_id = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await?
            .upload_id
            .ok_or_else(|| AwsError("missing upload id".to_string()))?;
        debug!(location = %self.location(), %upload_id, "created multipart upload");

        self.upload_id = Some(upload_id.to_string());
        Ok(upload_id)
    }

    /// Upload the next part.
    async fn upload_part(&mut self, data: Vec<u8>) -> Result<()> {
        let part_number = i32::try_from(self.completed_parts.len())? + 1;
        if part_number > MAX_PARTS {
            return Err(UploadError(format!(
                "{} would need more than {} parts, increase the part size",
                self.location(),
                MAX_PARTS
            )));
        }

        let upload_id = self.multipart_upload().await?;
        let part = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .part_number(part_number)
            .body(ByteStream::from(data))
            .send()
            .await?;

        self.completed_parts.push(
            CompletedPart::builder()
                .set_e_tag(part.e_tag)
                .part_number(part_number)
                .build(),
        );

        Ok(())
    }

    /// Upload the remaining data and complete the upload.
    async fn complete(&mut self) -> Result<()> {
        let Some(upload_id) = self.upload_id.clone() else {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&self.key)
                .body(ByteStream::from(std::mem::take(&mut self.buffer)))
                .send()
                .await?;
            return Ok(());
        };

        if !self.buffer.is_empty() {
            let data = std::mem::take(&mut self.buffer);
            self.upload_part(data).await?;
        }

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(std::mem::take(&mut self.completed_parts)))
                    .build(),
            )
            .send()
            .await?;

        Ok(())
    }
}

impl ObjectMeta for S3 {
    fn location(&self) -> String {
        Provider::format_s3(&self.bucket, &self.key)
    }
}

#[async_trait::async_trait]
impl ObjectWriter for S3 {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.aborted || self.closed {
            return Err(UploadError(format!("{} is no longer writable", self.location())));
        }

        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= self.part_size {
            let rest = self.buffer.split_off(self.part_size);
            let part = std::mem::replace(&mut self.buffer, rest);
            self.upload_part(part).await?;
        }

        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.aborted = true;
        self.buffer.clear();

        if let Some(upload_id) = self.upload_id.take() {
            self.client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(upload_id)
                .send()
                .await?;
        }

        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(UploadError(format!("{} is already closed", self.location())));
        }
        self.closed = true;
        if self.aborted {
            return Ok(());
        }

        self.complete().await
    }
}

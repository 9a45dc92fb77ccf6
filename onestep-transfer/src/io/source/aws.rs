//! Ranged reads of S3 objects.
//!

use crate::error::Error::DownloadError;
use crate::error::Result;
use crate::io::source::ObjectSource;
use crate::io::{ObjectMeta, Provider};
use crate::transfer::range::ByteRange;
use aws_sdk_s3::Client;
use bytes::Bytes;

/// An S3 object read with ranged `GetObject` calls.
#[derive(Debug, Clone)]
pub struct S3 {
    client: Client,
    bucket: String,
    key: String,
}

impl S3 {
    /// Create a new S3 source.
    pub fn new(client: Client, bucket: String, key: String) -> S3 {
        Self {
            client,
            bucket,
            key,
        }
    }

    /// Get the size of the object using `HeadObject`.
    pub async fn object_size(&self) -> Result<u64> {
        let size = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await?
            .content_length
            .ok_or_else(|| DownloadError(format!("{} has no content length", self.location())))?;

        Ok(u64::try_from(size)?)
    }

    /// Get a range of the object using `GetObject`, collecting the whole body.
    pub async fn object_range(&self, range: ByteRange) -> Result<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .range(range.to_header())
            .send()
            .await?;

        Ok(output.body.collect().await?.into_bytes())
    }
}

impl ObjectMeta for S3 {
    fn location(&self) -> String {
        Provider::format_s3(&self.bucket, &self.key)
    }
}

#[async_trait::async_trait]
impl ObjectSource for S3 {
    async fn size(&self) -> Result<u64> {
        self.object_size().await
    }

    async fn get_range(&self, range: ByteRange) -> Result<Bytes> {
        self.object_range(range).await
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::error::Error;
    use crate::test::{random_bytes, MemoryWriter};
    use crate::transfer::TransferJobBuilder;
    use aws_sdk_s3::operation::get_object::{GetObjectError, GetObjectOutput};
    use aws_sdk_s3::operation::head_object::HeadObjectOutput;
    use aws_sdk_s3::types::error::NoSuchKey;
    use aws_smithy_mocks::{mock, mock_client, Rule, RuleMode};
    use aws_smithy_types::byte_stream::ByteStream;

    #[tokio::test]
    async fn test_object_size() -> anyhow::Result<()> {
        let client = mock_client!(aws_sdk_s3, RuleMode::Sequential, &[&mock_head_object(250)]);
        let s3 = S3::new(client, "bucket".to_string(), "key".to_string());

        assert_eq!(s3.size().await?, 250);
        assert_eq!(s3.location(), "s3://bucket/key");

        Ok(())
    }

    #[tokio::test]
    async fn test_object_range() -> anyhow::Result<()> {
        let data = random_bytes(100, 1);
        let client = mock_client!(
            aws_sdk_s3,
            RuleMode::Sequential,
            &[&mock_get_object("bytes=0-99", data.clone())]
        );
        let s3 = S3::new(client, "bucket".to_string(), "key".to_string());

        assert_eq!(s3.get_range(ByteRange::new(0, 99)).await?, data);

        Ok(())
    }

    #[tokio::test]
    async fn test_missing_object() {
        let missing = mock!(Client::get_object)
            .then_error(|| GetObjectError::NoSuchKey(NoSuchKey::builder().build()));
        let client = mock_client!(aws_sdk_s3, RuleMode::Sequential, &[&missing]);
        let s3 = S3::new(client, "bucket".to_string(), "key".to_string());

        let result = s3.get_range(ByteRange::new(0, 99)).await;
        assert!(matches!(result, Err(Error::AwsError(_))));
    }

    #[tokio::test]
    async fn test_transfer_from_s3() -> anyhow::Result<()> {
        let data = random_bytes(250, 2);
        let client = mock_client!(
            aws_sdk_s3,
            RuleMode::Sequential,
            &[
                &mock_head_object(250),
                &mock_get_object("bytes=0-99", data[0..100].to_vec()),
                &mock_get_object("bytes=100-199", data[100..200].to_vec()),
                &mock_get_object("bytes=200-249", data[200..250].to_vec()),
            ]
        );
        let writer = MemoryWriter::default();

        let stats = TransferJobBuilder::default()
            .with_source(Box::new(S3::new(
                client,
                "bucket".to_string(),
                "key".to_string(),
            )))
            .with_writer(Box::new(writer.clone()))
            .with_chunk_size(100)
            .with_concurrency(2)
            .build()
            .await?
            .run()
            .await?;

        assert_eq!(writer.data(), data);
        assert_eq!(stats.ranges(), 3);
        assert_eq!(stats.bytes_transferred(), 250);

        Ok(())
    }

    fn mock_head_object(content_length: i64) -> Rule {
        mock!(Client::head_object)
            .match_requests(|req| req.bucket() == Some("bucket") && req.key() == Some("key"))
            .then_output(move || {
                HeadObjectOutput::builder()
                    .content_length(content_length)
                    .build()
            })
    }

    fn mock_get_object(range: &'static str, data: Vec<u8>) -> Rule {
        mock!(Client::get_object)
            .match_requests(move |req| {
                req.bucket() == Some("bucket")
                    && req.key() == Some("key")
                    && req.range() == Some(range)
            })
            .then_output(move || {
                GetObjectOutput::builder()
                    .body(ByteStream::from(data.clone()))
                    .build()
            })
    }
}

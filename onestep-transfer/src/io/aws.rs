//! Builders for S3 based operations.
//!

use crate::error::Error::ParseError;
use crate::error::Result;
use crate::io::{source, writer, Provider, DEFAULT_PART_SIZE};
use aws_sdk_s3::Client;

/// Build an S3 source or writer.
#[derive(Debug, Default)]
pub struct S3Builder {
    client: Option<Client>,
    bucket: Option<String>,
    key: Option<String>,
    url: Option<String>,
    part_size: Option<u64>,
}

impl S3Builder {
    /// Set the client.
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the key.
    pub fn with_key(mut self, key: String) -> Self {
        self.key = Some(key);
        self
    }

    /// Set the bucket.
    pub fn with_bucket(mut self, bucket: String) -> Self {
        self.bucket = Some(bucket);
        self
    }

    /// Set the multipart part size used when writing.
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = Some(part_size);
        self
    }

    /// Set the bucket and key from an S3 url, e.g.`s3://bucket/key`.
    pub fn parse_from_url(mut self, url: String) -> Self {
        self.url = Some(url);
        self
    }

    fn get_components(mut self) -> Result<(Client, String, String, u64)> {
        if let Some(url) = self.url.take() {
            let Provider::S3 { bucket, key } = Provider::parse_s3_url(&url)? else {
                return Err(ParseError(format!("{} is not an S3 url", url)));
            };
            self.bucket = Some(bucket);
            self.key = Some(key);
        }

        let error_fn =
            || ParseError("client, bucket and key are required in `S3Builder`".to_string());

        Ok((
            self.client.ok_or_else(error_fn)?,
            self.bucket.ok_or_else(error_fn)?,
            self.key.ok_or_else(error_fn)?,
            self.part_size.unwrap_or(DEFAULT_PART_SIZE),
        ))
    }

    /// Build a source using the client, bucket and key.
    pub fn build_source(self) -> Result<source::aws::S3> {
        let (client, bucket, key, _) = self.get_components()?;
        Ok(source::aws::S3::new(client, bucket, key))
    }

    /// Build a multipart writer using the client, bucket, key and part size.
    pub fn build_writer(self) -> Result<writer::aws::S3> {
        let (client, bucket, key, part_size) = self.get_components()?;
        writer::aws::S3::new(client, bucket, key, part_size)
    }
}

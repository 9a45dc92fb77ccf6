//! Builders for Google Cloud Storage based operations.
//!

use crate::error::Error::{ConfigError, ParseError};
use crate::error::Result;
use crate::io::writer::gcs::{http_client, Gcs};
use crate::io::{Provider, DEFAULT_PART_SIZE};
use tokio::process::Command;
use tracing::debug;

/// The public GCS endpoint.
pub const DEFAULT_ENDPOINT_URL: &str = "https://storage.googleapis.com";

/// Get an access token from the gcloud CLI.
pub async fn gcloud_access_token() -> Result<String> {
    debug!("requesting an access token from gcloud");
    let output = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|err| {
            ConfigError(format!(
                "no GCS access token was given and gcloud could not be run: {}",
                err
            ))
        })?;

    if !output.status.success() {
        return Err(ConfigError(format!(
            "gcloud auth print-access-token failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(ConfigError("gcloud returned an empty access token".to_string()));
    }

    Ok(token)
}

/// Build a GCS writer.
#[derive(Debug, Default)]
pub struct GcsBuilder {
    endpoint_url: Option<String>,
    bucket: Option<String>,
    object: Option<String>,
    access_token: Option<String>,
    chunk_size: Option<u64>,
}

impl GcsBuilder {
    /// Set the endpoint, e.g. for an emulator.
    pub fn with_endpoint_url(mut self, endpoint_url: String) -> Self {
        self.endpoint_url = Some(endpoint_url);
        self
    }

    /// Set the bucket.
    pub fn with_bucket(mut self, bucket: String) -> Self {
        self.bucket = Some(bucket);
        self
    }

    /// Set the object name.
    pub fn with_object(mut self, object: String) -> Self {
        self.object = Some(object);
        self
    }

    /// Set the OAuth access token.
    pub fn with_access_token(mut self, access_token: String) -> Self {
        self.access_token = Some(access_token);
        self
    }

    /// Set the resumable upload chunk size.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Set the bucket and object from a GCS url, e.g.`gs://bucket/object`.
    pub fn parse_from_url(self, url: &str) -> Result<Self> {
        let Provider::Gs { bucket, object } = Provider::parse_gs_url(url)? else {
            return Err(ParseError(format!("{} is not a GCS url", url)));
        };

        Ok(self.with_bucket(bucket).with_object(object))
    }

    /// Build a resumable upload writer.
    pub fn build_writer(self) -> Result<Gcs> {
        let error_fn = || {
            ParseError("bucket, object and access token are required in `GcsBuilder`".to_string())
        };

        Gcs::new(
            http_client()?,
            self.endpoint_url
                .unwrap_or_else(|| DEFAULT_ENDPOINT_URL.to_string()),
            self.bucket.ok_or_else(error_fn)?,
            self.object.ok_or_else(error_fn)?,
            self.access_token.ok_or_else(error_fn)?,
            self.chunk_size.unwrap_or(DEFAULT_PART_SIZE),
        )
    }
}

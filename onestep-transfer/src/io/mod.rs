//! Module that handles all object IO.
//!

use crate::error::Error::ParseError;
use crate::error::{Error, Result};
use crate::io::source::ObjectSource;
use crate::io::writer::ObjectWriter;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;

pub mod aws;
pub mod gcs;
pub mod source;
pub mod writer;

/// The default multipart part size and resumable upload chunk size. 16 MiB.
pub const DEFAULT_PART_SIZE: u64 = 16777216;

/// The type of provider for the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    File { file: String },
    S3 { bucket: String, key: String },
    Gs { bucket: String, object: String },
}

impl Provider {
    /// Format an S3 url.
    pub fn format_s3(bucket: &str, key: &str) -> String {
        format!("s3://{}/{}", bucket, key)
    }

    /// Format a GCS url.
    pub fn format_gs(bucket: &str, object: &str) -> String {
        format!("gs://{}/{}", bucket, object)
    }

    /// Format a file url.
    pub fn format_file(file: &str) -> String {
        format!("file://{}", file)
    }

    /// Format the provider into a string.
    pub fn format(&self) -> String {
        match self {
            Provider::File { file } => Self::format_file(file),
            Provider::S3 { bucket, key } => Self::format_s3(bucket, key),
            Provider::Gs { bucket, object } => Self::format_gs(bucket, object),
        }
    }

    /// Split a `scheme://bucket/key` url into its bucket and key.
    fn parse_bucket_url(s: &str, scheme: &str, name: &str) -> Result<(String, String)> {
        let Some(stripped) = s.strip_prefix(scheme) else {
            return Err(ParseError(format!("{} is not {} url", s, name)));
        };

        let Some((bucket, key)) = stripped.split_once('/') else {
            return Err(ParseError(format!("failed to parse {}", s)));
        };

        if bucket.is_empty() {
            return Err(ParseError(format!("{} is missing a bucket", s)));
        }
        if key.is_empty() {
            return Err(ParseError(format!("{} is missing a key", s)));
        }

        Ok((bucket.to_string(), key.to_string()))
    }

    /// Parse from an S3 url, e.g.`s3://bucket/key`.
    pub fn parse_s3_url(s: &str) -> Result<Self> {
        let (bucket, key) = Self::parse_bucket_url(s, "s3://", "an S3")?;
        Ok(Self::S3 { bucket, key })
    }

    /// Parse from a GCS url, e.g.`gs://bucket/object`.
    pub fn parse_gs_url(s: &str) -> Result<Self> {
        let (bucket, object) = Self::parse_bucket_url(s, "gs://", "a GCS")?;
        Ok(Self::Gs { bucket, object })
    }

    /// Parse from a string a file name which can optionally be prefixed with `file://`
    pub fn parse_file_url(s: &str) -> Self {
        Self::File {
            file: s.strip_prefix("file://").unwrap_or(s).to_string(),
        }
    }
}

impl TryFrom<&str> for Provider {
    type Error = Error;

    fn try_from(url: &str) -> Result<Self> {
        if url.starts_with("s3://") {
            Self::parse_s3_url(url)
        } else if url.starts_with("gs://") {
            Self::parse_gs_url(url)
        } else {
            Ok(Self::parse_file_url(url))
        }
    }
}

/// Obtain metadata information on objects.
pub trait ObjectMeta {
    /// Get the location of the object.
    fn location(&self) -> String;
}

/// Options used to construct clients for the object stores.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub aws_region: Option<String>,
    pub aws_profile: Option<String>,
    pub aws_endpoint_url: Option<String>,
    pub gcs_access_token: Option<String>,
    pub gcs_endpoint_url: Option<String>,
    pub part_size: Option<u64>,
}

/// Create an S3 client from the environment and any overrides. A custom endpoint uses path
/// style addressing.
pub async fn create_s3_client(options: &ClientOptions) -> Client {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = &options.aws_region {
        loader = loader.region(Region::new(region.to_string()));
    }
    if let Some(profile) = &options.aws_profile {
        loader = loader.profile_name(profile);
    }
    if let Some(endpoint_url) = &options.aws_endpoint_url {
        loader = loader.endpoint_url(endpoint_url);
    }

    let config = loader.load().await;
    let config = aws_sdk_s3::config::Builder::from(&config)
        .force_path_style(options.aws_endpoint_url.is_some())
        .build();

    Client::from_conf(config)
}

/// Build io from object URLs.
#[derive(Debug, Default)]
pub struct IoBuilder {
    options: ClientOptions,
}

impl IoBuilder {
    /// Set the client options.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// Build an `ObjectSource` instance. Only files and S3 objects can be read from.
    pub async fn build_source(&self, url: &str) -> Result<Box<dyn ObjectSource + Send + Sync>> {
        match Provider::try_from(url)? {
            Provider::File { file } => Ok(Box::new(source::file::File::new(file))),
            Provider::S3 { bucket, key } => Ok(Box::new(
                aws::S3Builder::default()
                    .with_client(create_s3_client(&self.options).await)
                    .with_bucket(bucket)
                    .with_key(key)
                    .build_source()?,
            )),
            Provider::Gs { .. } => Err(ParseError(format!(
                "{} is not a supported source, use an S3 url or a file",
                url
            ))),
        }
    }

    /// Build an `ObjectWriter` instance.
    pub async fn build_writer(&self, url: &str) -> Result<Box<dyn ObjectWriter + Send>> {
        let part_size = self.options.part_size.unwrap_or(DEFAULT_PART_SIZE);

        match Provider::try_from(url)? {
            Provider::File { file } => Ok(Box::new(writer::file::File::new(file))),
            Provider::S3 { bucket, key } => Ok(Box::new(
                aws::S3Builder::default()
                    .with_client(create_s3_client(&self.options).await)
                    .with_bucket(bucket)
                    .with_key(key)
                    .with_part_size(part_size)
                    .build_writer()?,
            )),
            Provider::Gs { bucket, object } => {
                let mut builder = gcs::GcsBuilder::default()
                    .with_bucket(bucket)
                    .with_object(object)
                    .with_chunk_size(part_size);
                if let Some(endpoint_url) = &self.options.gcs_endpoint_url {
                    builder = builder.with_endpoint_url(endpoint_url.to_string());
                }
                let token = match &self.options.gcs_access_token {
                    Some(token) => token.to_string(),
                    None => gcs::gcloud_access_token().await?,
                };

                Ok(Box::new(builder.with_access_token(token).build_writer()?))
            }
        }
    }
}

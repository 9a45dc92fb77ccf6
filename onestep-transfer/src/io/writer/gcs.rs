//! Sequential writes to Google Cloud Storage using the resumable upload protocol.
//!

use crate::error::Error::{ParseError, UploadError};
use crate::error::Result;
use crate::io::writer::ObjectWriter;
use crate::io::{ObjectMeta, Provider};
use crate::transfer::encode_crc32c;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, LOCATION, RANGE};
use reqwest::redirect::Policy;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::debug;

/// Every chunk except the last must be a multiple of this. 256 KiB.
pub const CHUNK_ALIGNMENT: u64 = 262144;

/// The status GCS responds with when a chunk was accepted but the upload is not complete.
const RESUME_INCOMPLETE: u16 = 308;

/// The status GCS responds with when a session was cancelled.
const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Round the chunk size up to a multiple of the chunk alignment.
pub fn align_chunk_size(chunk_size: u64) -> u64 {
    chunk_size.div_ceil(CHUNK_ALIGNMENT).max(1) * CHUNK_ALIGNMENT
}

/// The `Content-Range` of a chunk. The total is unknown until the last chunk.
pub fn content_range(start: u64, len: u64, total: Option<u64>) -> String {
    let total = total.map_or_else(|| "*".to_string(), |total| total.to_string());
    if len == 0 {
        format!("bytes */{}", total)
    } else {
        format!("bytes {}-{}/{}", start, start + len - 1, total)
    }
}

/// The number of bytes the server has persisted, from the `Range: bytes=0-N` header.
pub fn persisted_size(range: Option<&str>) -> Result<u64> {
    let Some(range) = range else {
        return Ok(0);
    };

    range
        .strip_prefix("bytes=0-")
        .and_then(|end| end.parse::<u64>().ok())
        .map(|end| end + 1)
        .ok_or_else(|| ParseError(format!("invalid range header: {}", range)))
}

/// Create an HTTP client for resumable uploads. Redirects are not followed because GCS uses
/// status 308 to acknowledge chunks.
pub fn http_client() -> Result<Client> {
    Ok(Client::builder().redirect(Policy::none()).build()?)
}

/// The parts of the object resource returned when an upload completes.
#[derive(Debug, Deserialize)]
struct ObjectResource {
    crc32c: Option<String>,
    size: Option<String>,
}

/// A GCS object written through a resumable upload session. The session is opened on the first
/// full chunk, and the object only becomes visible when the last chunk is accepted.
#[derive(Debug)]
pub struct Gcs {
    client: Client,
    endpoint_url: String,
    bucket: String,
    object: String,
    access_token: String,
    content_type: String,
    chunk_size: usize,
    session_url: Option<String>,
    buffer: Vec<u8>,
    offset: u64,
    crc32c: u32,
    aborted: bool,
    closed: bool,
}

impl Gcs {
    /// Create a new GCS writer. The chunk size is rounded up to the chunk alignment.
    pub fn new(
        client: Client,
        endpoint_url: String,
        bucket: String,
        object: String,
        access_token: String,
        chunk_size: u64,
    ) -> Result<Self> {
        Ok(Self {
            client,
            endpoint_url: endpoint_url.trim_end_matches('/').to_string(),
            bucket,
            object,
            access_token,
            content_type: "application/octet-stream".to_string(),
            chunk_size: usize::try_from(align_chunk_size(chunk_size))?,
            session_url: None,
            buffer: Vec::new(),
            offset: 0,
            crc32c: 0,
            aborted: false,
            closed: false,
        })
    }

    async fn error_from(&self, what: &str, response: Response) -> crate::error::Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        UploadError(format!(
            "{} {}: {} {}",
            what,
            self.location(),
            status,
            body.trim()
        ))
    }

    /// Get the session url, starting a resumable upload if there is none.
    async fn session(&mut self) -> Result<String> {
        if let Some(session_url) = &self.session_url {
            return Ok(session_url.to_string());
        }

        let response = self
            .client
            .post(format!(
                "{}/upload/storage/v1/b/{}/o",
                self.endpoint_url, self.bucket
            ))
            .query(&[("uploadType", "resumable"), ("name", self.object.as_str())])
            .bearer_auth(&self.access_token)
            .header("X-Upload-Content-Type", &self.content_type)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from("starting upload to", response).await);
        }

        let session_url = response
            .headers()
            .get(LOCATION)
            .and_then(|location| location.to_str().ok())
            .ok_or_else(|| {
                UploadError(format!("no session url for {}", self.location()))
            })?
            .to_string();
        debug!(location = %self.location(), "started resumable upload");

        self.session_url = Some(session_url.to_string());
        Ok(session_url)
    }

    /// Send one full chunk from the front of the buffer and drop what the server persisted.
    async fn put_chunk(&mut self) -> Result<()> {
        let session_url = self.session().await?;
        let len = self.chunk_size as u64;
        let response = self
            .client
            .put(session_url)
            .header(CONTENT_RANGE, content_range(self.offset, len, None))
            .body(self.buffer[..self.chunk_size].to_vec())
            .send()
            .await?;
        if response.status().as_u16() != RESUME_INCOMPLETE {
            return Err(self.error_from("writing chunk to", response).await);
        }

        let persisted = persisted_size(
            response
                .headers()
                .get(RANGE)
                .and_then(|range| range.to_str().ok()),
        )?;
        if persisted <= self.offset || persisted > self.offset + len {
            return Err(UploadError(format!(
                "{} persisted {} bytes after a chunk at offset {}",
                self.location(),
                persisted,
                self.offset
            )));
        }

        self.buffer.drain(..usize::try_from(persisted - self.offset)?);
        self.offset = persisted;

        Ok(())
    }

    /// Send the remaining buffer as the last chunk and verify the stored checksum.
    async fn put_last_chunk(&mut self) -> Result<()> {
        let session_url = self.session().await?;
        let len = self.buffer.len() as u64;
        let total = self.offset + len;
        let response = self
            .client
            .put(session_url)
            .header(CONTENT_RANGE, content_range(self.offset, len, Some(total)))
            .body(std::mem::take(&mut self.buffer))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from("finalizing", response).await);
        }
        self.offset = total;

        let object: ObjectResource = response.json().await?;
        if let Some(size) = object.size {
            if size != total.to_string() {
                return Err(UploadError(format!(
                    "{} has size {} but {} bytes were written",
                    self.location(),
                    size,
                    total
                )));
            }
        }

        let expected = encode_crc32c(self.crc32c);
        match object.crc32c {
            Some(crc32c) if crc32c == expected => Ok(()),
            Some(crc32c) => Err(UploadError(format!(
                "{} has crc32c {} but {} was expected",
                self.location(),
                crc32c,
                expected
            ))),
            None => {
                debug!(location = %self.location(), "no crc32c in response, skipping verification");
                Ok(())
            }
        }
    }
}

impl ObjectMeta for Gcs {
    fn location(&self) -> String {
        Provider::format_gs(&self.bucket, &self.object)
    }
}

#[async_trait::async_trait]
impl ObjectWriter for Gcs {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.aborted || self.closed {
            return Err(UploadError(format!("{} is no longer writable", self.location())));
        }

        self.crc32c = crc32c::crc32c_append(self.crc32c, data);
        self.buffer.extend_from_slice(data);
        while self.buffer.len() >= self.chunk_size {
            self.put_chunk().await?;
        }

        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.aborted = true;
        self.buffer.clear();

        let Some(session_url) = self.session_url.take() else {
            return Ok(());
        };
        let response = self
            .client
            .delete(session_url)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;
        let status = response.status();
        if status.is_success() || status.as_u16() == CLIENT_CLOSED_REQUEST {
            debug!(location = %self.location(), "cancelled resumable upload");
            return Ok(());
        }

        Err(self.error_from("cancelling upload to", response).await)
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(UploadError(format!("{} is already closed", self.location())));
        }
        self.closed = true;
        if self.aborted {
            return Ok(());
        }

        self.put_last_chunk().await
    }
}

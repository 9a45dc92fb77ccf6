//! Error handling logic.
//!

use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::byte_stream::error::Error as ByteStreamError;
use aws_smithy_types::error::display::DisplayErrorContext;
use std::fmt::Debug;
use std::num::TryFromIntError;
use std::{error, io, result};
use thiserror::Error;
use tokio::sync::AcquireError;
use tokio::task::JoinError;

/// The result type.
pub type Result<T> = result::Result<T, Error>;

/// Error types for onestep-transfer.
#[derive(Error, Debug)]
pub enum Error {
    #[error("downloading the source: {0}")]
    DownloadError(String),
    #[error("uploading to the destination: {0}")]
    UploadError(String),
    #[error("transfer timed out: {0}")]
    TimeoutError(String),
    #[error("invalid transfer configuration: {0}")]
    ConfigError(String),
    #[error("parsing: {0}")]
    ParseError(String),
    #[error("aws error: {0}")]
    AwsError(String),
    #[error("http error: {0}")]
    HttpError(String),
    #[error("in concurrency logic: {0}")]
    ConcurrencyError(String),
    #[error("serde error: {0}")]
    SerdeError(String),
    #[error("performing IO: {0}")]
    IoError(#[from] io::Error),
}

/// The kind of failure that ended a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A range could not be downloaded, or the source could not be probed.
    Download,
    /// The destination rejected a write or failed to finalize.
    Upload,
    /// The cancellation signal fired before the transfer finished.
    Timeout,
    /// The transfer parameters were invalid.
    Config,
}

impl Error {
    /// The transfer failure kind, if this error is one of the transfer errors.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::DownloadError(_) => Some(ErrorKind::Download),
            Error::UploadError(_) => Some(ErrorKind::Upload),
            Error::TimeoutError(_) => Some(ErrorKind::Timeout),
            Error::ConfigError(_) => Some(ErrorKind::Config),
            _ => None,
        }
    }
}

impl<T, R> From<SdkError<T, R>> for Error
where
    T: error::Error + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    fn from(err: SdkError<T, R>) -> Self {
        Self::AwsError(DisplayErrorContext(err).to_string())
    }
}

impl From<ByteStreamError> for Error {
    fn from(err: ByteStreamError) -> Self {
        Self::AwsError(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::SerdeError(err.to_string())
    }
}

impl From<TryFromIntError> for Error {
    fn from(err: TryFromIntError) -> Self {
        Self::ParseError(err.to_string())
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        Self::ConcurrencyError(err.to_string())
    }
}

impl From<AcquireError> for Error {
    fn from(err: AcquireError) -> Self {
        Self::ConcurrencyError(err.to_string())
    }
}

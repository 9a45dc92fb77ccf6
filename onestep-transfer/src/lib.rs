//! Stream a single object from S3 or a local file into Google Cloud Storage, S3 or a local file.
//! Consecutive byte ranges of the source are downloaded ahead of a single ordered uploader, with
//! at most a bounded number of chunks held in memory at once.
//!

pub mod cli;
pub mod error;
pub mod io;
pub mod transfer;

#[doc(hidden)]
pub mod test;

//! IO related to reading ranges of a source object.
//!

pub mod aws;
pub mod file;

use crate::error::Result;
use crate::io::ObjectMeta;
use crate::transfer::range::ByteRange;
use bytes::Bytes;

/// Random access reads on file based or cloud objects.
#[async_trait::async_trait]
pub trait ObjectSource: ObjectMeta {
    /// Get the total size of the object.
    async fn size(&self) -> Result<u64>;

    /// Read the inclusive range of the object. The returned bytes may be shorter than the range
    /// if the object is shorter than expected.
    async fn get_range(&self, range: ByteRange) -> Result<Bytes>;
}

//! IO related to writing data to a destination object.
//!

pub mod aws;
pub mod file;
pub mod gcs;

use crate::error::Result;
use crate::io::ObjectMeta;

/// Sequential, append-only writes on file based or cloud objects.
#[async_trait::async_trait]
pub trait ObjectWriter: ObjectMeta {
    /// Append data to the object.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Discard anything written so far. A later `close` must not commit the object.
    async fn abort(&mut self) -> Result<()> {
        Ok(())
    }

    /// Finalize the object. Called exactly once.
    async fn close(&mut self) -> Result<()>;
}

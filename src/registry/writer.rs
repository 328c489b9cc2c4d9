//! Outbound half of a viewer connection
//!
//! The registry only needs to push payloads and to hang up, so it talks to
//! viewers through this trait instead of a concrete socket type.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Write side of one subscriber connection
#[async_trait]
pub trait FrameWriter: Send {
    /// Deliver one frame payload as a single transport message
    async fn write_frame(&mut self, payload: Bytes) -> Result<()>;

    /// Start a graceful close of the connection
    async fn close(&mut self) -> Result<()>;
}

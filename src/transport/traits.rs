//! Transport traits for unified communication interface
//!
//! A transport moves opaque frames between gossip engines. Delivery is
//! best-effort: frames may be lost, duplicated or reordered.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Inbound frame stream handed out by [`Transport::subscribe`]
pub type Frames = mpsc::Receiver<Bytes>;

/// Send frames to addresses and receive a stream of inbound frames
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one frame to `address` (`host:port`)
    async fn write(&self, data: &[u8], address: &str) -> Result<()>;

    /// Take the inbound frame stream.
    ///
    /// The stream can be taken once; later calls fail. It ends when the
    /// transport is stopped.
    fn subscribe(&self) -> Result<Frames>;

    /// Stop background tasks and wait for them to exit
    async fn stop(&self);
}

//! UDP Transport Implementation
//!
//! One bound UDP socket per transport. A background task reads datagrams
//! into a bounded channel; writes resolve the destination and send a single
//! datagram. No fragmentation, no retries, no ordering.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::resolve_address;
use super::traits::{Frames, Transport};
use crate::error::Result;
use crate::transport_error;

/// Largest payload a single IPv4 UDP datagram can carry
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Inbound frames buffered before the read task starts dropping
pub const FRAME_CHANNEL_CAPACITY: usize = 1024;

/// Counters for the transport
#[derive(Debug, Default)]
pub struct TransportStats {
    pub frames_sent: AtomicU64,
    pub send_errors: AtomicU64,
    pub frames_received: AtomicU64,
    pub receive_errors: AtomicU64,
    pub frames_dropped: AtomicU64,
}

/// Point-in-time copy of [`TransportStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrozenTransportStats {
    pub frames_sent: u64,
    pub send_errors: u64,
    pub frames_received: u64,
    pub receive_errors: u64,
    pub frames_dropped: u64,
}

impl TransportStats {
    pub fn freeze(&self) -> FrozenTransportStats {
        FrozenTransportStats {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Raw, unreliable datagram transport
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
    frames: Mutex<Option<Frames>>,
    stats: Arc<TransportStats>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl std::fmt::Debug for UdpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UdpTransport")
            .field("local_addr", &self.local_addr)
            .field("stopped", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl UdpTransport {
    /// Bind a UDP socket at `address` and start reading from it
    pub async fn bind(address: &str) -> Result<Self> {
        let bind_addr = resolve_address(address)
            .await
            .map_err(|e| crate::config_error!("Invalid listen address {}: {}", address, e))?;
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let local_addr = socket.local_addr()?;

        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let stats = Arc::new(TransportStats::default());
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        tracker.spawn(read_loop(
            Arc::clone(&socket),
            frame_tx,
            Arc::clone(&stats),
            shutdown.clone(),
        ));
        tracker.close();

        info!("UDP transport listening on {}", local_addr);

        Ok(Self {
            socket,
            local_addr,
            frames: Mutex::new(Some(frame_rx)),
            stats,
            shutdown,
            tracker,
        })
    }

    /// The address the socket is actually bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn stats(&self) -> FrozenTransportStats {
        self.stats.freeze()
    }
}

async fn read_loop(
    socket: Arc<UdpSocket>,
    frame_tx: mpsc::Sender<Bytes>,
    stats: Arc<TransportStats>,
    shutdown: CancellationToken,
) {
    let mut buf = vec![0u8; 65536];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, peer)) => {
                    stats.frames_received.fetch_add(1, Ordering::Relaxed);
                    match frame_tx.try_send(Bytes::copy_from_slice(&buf[..len])) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                            debug!("Frame channel full, dropping {} bytes from {}", len, peer);
                        }
                        Err(TrySendError::Closed(_)) => {
                            stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                Err(e) => {
                    stats.receive_errors.fetch_add(1, Ordering::Relaxed);
                    debug!("UDP receive error: {}", e);
                }
            }
        }
    }

    debug!("UDP read loop exited");
}

#[async_trait]
impl Transport for UdpTransport {
    async fn write(&self, data: &[u8], address: &str) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(transport_error!("transport stopped"));
        }
        if data.len() > MAX_DATAGRAM_SIZE {
            self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
            return Err(transport_error!(
                "Frame too large: {} bytes (max: {} bytes)",
                data.len(),
                MAX_DATAGRAM_SIZE
            ));
        }

        let target = resolve_address(address).await.map_err(|e| {
            self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
            e
        })?;

        match self.socket.send_to(data, target).await {
            Ok(sent) if sent == data.len() => {
                self.stats.frames_sent.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Ok(sent) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(transport_error!(
                    "Partial send to {}: {}/{} bytes",
                    target,
                    sent,
                    data.len()
                ))
            }
            Err(e) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(transport_error!("Failed to send to {}: {}", target, e))
            }
        }
    }

    fn subscribe(&self) -> Result<Frames> {
        self.frames
            .lock()
            .take()
            .ok_or_else(|| transport_error!("frame stream already taken"))
    }

    async fn stop(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Stopping UDP transport on {}", self.local_addr);
        }
        self.shutdown.cancel();
        self.tracker.wait().await;
        if let Some(frames) = self.frames.lock().as_mut() {
            frames.close();
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        if !self.shutdown.is_cancelled() {
            warn!("UDP transport on {} dropped without stop()", self.local_addr);
            self.shutdown.cancel();
        }
    }
}

//! Datagram transports for gossip traffic
//!
//! `UdpTransport` is the raw, unreliable transport. `EncryptedTransport`
//! wraps any other transport with AES-GCM. Both implement [`Transport`], so
//! the gossip engine only ever sees an `Arc<dyn Transport>`.

pub mod secure_transport;
pub mod traits;
pub mod udp_transport;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::settings::Settings;
use crate::transport_error;
pub use secure_transport::{EncryptedTransport, FrameCipher, NONCE_SIZE};
pub use traits::{Frames, Transport};
pub use udp_transport::{FrozenTransportStats, TransportStats, UdpTransport, MAX_DATAGRAM_SIZE};

/// Resolve `host:port` to the first socket address it names
pub async fn resolve_address(address: &str) -> Result<SocketAddr> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    tokio::net::lookup_host(address)
        .await
        .map_err(|e| transport_error!("Failed to resolve {}: {}", address, e))?
        .next()
        .ok_or_else(|| transport_error!("No addresses found for {}", address))
}

/// Bind the transport stack described by `settings`.
///
/// Returns the transport and the address it is bound to. With a key, the
/// UDP transport is wrapped in an `EncryptedTransport`.
pub async fn build_transport(settings: &Settings) -> Result<(Arc<dyn Transport>, SocketAddr)> {
    // Reject a bad key before binding anything
    let cipher = settings
        .encryption_key
        .as_deref()
        .map(FrameCipher::new)
        .transpose()?;

    let udp = UdpTransport::bind(&settings.listen_address).await?;
    let local_addr = udp.local_addr();

    let transport: Arc<dyn Transport> = match cipher {
        Some(cipher) => {
            info!("Encrypting gossip traffic with {}", cipher.algorithm());
            Arc::new(EncryptedTransport::with_cipher(udp, cipher))
        }
        None => Arc::new(udp),
    };

    Ok((transport, local_addr))
}

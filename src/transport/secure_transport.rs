//! Encrypting transport decorator
//!
//! Wraps any [`Transport`] with AES-GCM. Each outgoing frame is sealed under
//! a fresh random nonce and sent as `nonce || ciphertext`. Inbound frames
//! that are too short or fail authentication are dropped without surfacing
//! an error, so a peer with the wrong key simply goes quiet.
//!
//! There is no replay protection: a captured frame decrypts again if resent.
use std::sync::Arc;

use aes::Aes192;
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use super::traits::{Frames, Transport};
use super::udp_transport::FRAME_CHANNEL_CAPACITY;
use crate::error::{Result, RumorError};

/// Size of the AES-GCM nonce prefixed to every frame
pub const NONCE_SIZE: usize = 12;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// AES-GCM with the key size picked from the key length
pub enum FrameCipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl std::fmt::Debug for FrameCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FrameCipher").field(&self.algorithm()).finish()
    }
}

impl FrameCipher {
    /// Build a cipher from a 16, 24, or 32 byte key
    pub fn new(key: &[u8]) -> Result<Self> {
        let invalid = |_| RumorError::InvalidKey(key.len());
        match key.len() {
            16 => Ok(Self::Aes128(Aes128Gcm::new_from_slice(key).map_err(invalid)?)),
            24 => Ok(Self::Aes192(Aes192Gcm::new_from_slice(key).map_err(invalid)?)),
            32 => Ok(Self::Aes256(Aes256Gcm::new_from_slice(key).map_err(invalid)?)),
            len => Err(RumorError::InvalidKey(len)),
        }
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Aes128(_) => "AES-128-GCM",
            Self::Aes192(_) => "AES-192-GCM",
            Self::Aes256(_) => "AES-256-GCM",
        }
    }

    /// Encrypt `plaintext` into `nonce || ciphertext`
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Aes128(cipher) => seal_with(cipher, plaintext),
            Self::Aes192(cipher) => seal_with(cipher, plaintext),
            Self::Aes256(cipher) => seal_with(cipher, plaintext),
        }
    }

    /// Split off the nonce and decrypt the rest of `frame`
    pub fn open(&self, frame: &[u8]) -> Result<Vec<u8>> {
        if frame.len() < NONCE_SIZE {
            return Err(RumorError::Crypto(format!(
                "frame too short: {} bytes",
                frame.len()
            )));
        }
        let (nonce, ciphertext) = frame.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce);
        let plaintext = match self {
            Self::Aes128(cipher) => cipher.decrypt(nonce, ciphertext)?,
            Self::Aes192(cipher) => cipher.decrypt(nonce, ciphertext)?,
            Self::Aes256(cipher) => cipher.decrypt(nonce, ciphertext)?,
        };
        Ok(plaintext)
    }
}

fn seal_with<C>(cipher: &C, plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: Aead + AeadCore<NonceSize = U12>,
{
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher.encrypt(&nonce, plaintext)?;

    let mut frame = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    frame.extend_from_slice(&nonce);
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

/// Transport decorator that seals outgoing and opens incoming frames
pub struct EncryptedTransport<T> {
    inner: T,
    cipher: Arc<FrameCipher>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl<T: Transport> EncryptedTransport<T> {
    /// Wrap `inner`; fails with `InvalidKey` unless the key is 16, 24, or 32 bytes
    pub fn new(inner: T, key: &[u8]) -> Result<Self> {
        Ok(Self::with_cipher(inner, FrameCipher::new(key)?))
    }

    pub fn with_cipher(inner: T, cipher: FrameCipher) -> Self {
        Self {
            inner,
            cipher: Arc::new(cipher),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

async fn open_loop(
    mut sealed: Frames,
    plain_tx: mpsc::Sender<Bytes>,
    cipher: Arc<FrameCipher>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = sealed.recv() => {
                let Some(frame) = frame else { break };
                match cipher.open(&frame) {
                    Ok(plaintext) => match plain_tx.try_send(Bytes::from(plaintext)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            debug!("Decrypted frame channel full, dropping frame");
                        }
                        Err(TrySendError::Closed(_)) => break,
                    },
                    Err(e) => {
                        debug!("Dropping undecryptable frame ({} bytes): {}", frame.len(), e);
                    }
                }
            }
        }
    }

    debug!("Decrypt loop exited");
}

#[async_trait]
impl<T: Transport> Transport for EncryptedTransport<T> {
    async fn write(&self, data: &[u8], address: &str) -> Result<()> {
        let frame = self.cipher.seal(data)?;
        self.inner.write(&frame, address).await
    }

    fn subscribe(&self) -> Result<Frames> {
        let sealed = self.inner.subscribe()?;
        let (plain_tx, plain_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        self.tracker.spawn(open_loop(
            sealed,
            plain_tx,
            Arc::clone(&self.cipher),
            self.shutdown.clone(),
        ));
        Ok(plain_rx)
    }

    async fn stop(&self) {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.inner.stop().await;
    }
}

//! Gossip Message Protocol
//!
//! Every datagram carries one `Message`: a type discriminator followed by a
//! length-prefixed payload. Sync and Ping payloads are an encoded list of
//! `Node` records.
//!
//! All wire encoding uses bincode (standard config, big-endian). The field
//! layout of `Message` and `Node` is a protocol contract; changing it breaks
//! interoperability with older engines.
use std::net::SocketAddr;

use bincode::{Decode, Encode};

use crate::error::{CodecError, Result};
use crate::membership::Node;

/// Gossip message types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Decode, Encode)]
pub enum MessageType {
    /// Liveness probe; any node list it carries is merged under `PingHandling::Merge`
    Ping,
    /// Full membership snapshot
    Sync,
}

/// A single gossip datagram
#[derive(Clone, Debug, PartialEq, Eq, Decode, Encode)]
pub struct Message {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

fn wire_config() -> impl bincode::config::Config {
    bincode::config::standard().with_big_endian()
}

impl Message {
    /// A Ping with no payload
    pub fn ping() -> Self {
        Self {
            message_type: MessageType::Ping,
            payload: Vec::new(),
        }
    }

    /// A Ping carrying the given records
    pub fn ping_with(nodes: &[Node]) -> Result<Self> {
        Ok(Self {
            message_type: MessageType::Ping,
            payload: encode_nodes(nodes)?,
        })
    }

    /// A Sync carrying the given snapshot
    pub fn sync(nodes: &[Node]) -> Result<Self> {
        Ok(Self {
            message_type: MessageType::Sync,
            payload: encode_nodes(nodes)?,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        bincode::encode_to_vec(self, wire_config()).map_err(|e| CodecError::Encode(e).into())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        decode_exact(data)
    }

    /// Records carried by this message; empty when there is no payload
    pub fn nodes(&self) -> Result<Vec<Node>> {
        if self.payload.is_empty() {
            return Ok(Vec::new());
        }
        decode_nodes(&self.payload)
    }
}

pub fn encode_nodes(nodes: &[Node]) -> Result<Vec<u8>> {
    bincode::encode_to_vec(nodes, wire_config()).map_err(|e| CodecError::Encode(e).into())
}

/// Decode a node list, rejecting any record whose address is not `ip:port`
pub fn decode_nodes(data: &[u8]) -> Result<Vec<Node>> {
    let nodes: Vec<Node> = decode_exact(data)?;
    if let Some(bad) = nodes
        .iter()
        .find(|node| node.address.parse::<SocketAddr>().is_err())
    {
        return Err(CodecError::InvalidAddress(bad.address.clone()).into());
    }
    Ok(nodes)
}

fn decode_exact<T: Decode<()>>(data: &[u8]) -> Result<T> {
    let (value, consumed) =
        bincode::decode_from_slice(data, wire_config()).map_err(CodecError::Decode)?;
    if consumed != data.len() {
        return Err(CodecError::TrailingBytes(data.len() - consumed).into());
    }
    Ok(value)
}

//! Cluster member records
//!
//! A `Node` is what gets gossiped: one member's address, liveness state,
//! last change time and application payload. Records are plain values; the
//! membership store decides which copy wins.
use std::fmt;

use bincode::{Decode, Encode};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Liveness classification of a member.
///
/// Only `Alive` is produced today. The variant order is part of the wire
/// format and must not change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Decode, Encode, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    #[default]
    Alive,
    Suspected,
    Dead,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Alive => write!(f, "alive"),
            NodeState::Suspected => write!(f, "suspected"),
            NodeState::Dead => write!(f, "dead"),
        }
    }
}

/// A single member of the cluster
#[derive(Clone, Debug, PartialEq, Eq, Decode, Encode, Serialize, Deserialize)]
pub struct Node {
    /// Canonical `ip:port` of the member's datagram endpoint
    pub address: String,
    pub state: NodeState,
    /// Microseconds since the Unix epoch; 0 means never observed
    pub last_updated: u64,
    pub payload: Vec<u8>,
}

impl Node {
    /// A locally seeded peer: alive, never observed, no payload
    pub fn seed(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            state: NodeState::Alive,
            last_updated: 0,
            payload: Vec::new(),
        }
    }

    /// An alive node stamped with the current time
    pub fn alive(address: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            address: address.into(),
            state: NodeState::Alive,
            last_updated: now_micros(),
            payload,
        }
    }

    /// Advance `last_updated` to now, or one tick past its old value if
    /// the clock has not moved (or went backwards).
    pub fn touch(&mut self) {
        self.last_updated = now_micros().max(self.last_updated.saturating_add(1));
    }

    /// `last_updated` as a wall-clock time, if it has ever been set
    pub fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        if self.last_updated == 0 {
            return None;
        }
        let secs = i64::try_from(self.last_updated / 1_000_000).ok()?;
        let nanos = u32::try_from((self.last_updated % 1_000_000) * 1_000).ok()?;
        Utc.timestamp_opt(secs, nanos).single()
    }

    /// The same record with its payload stripped, used as a liveness heartbeat
    pub fn heartbeat(&self) -> Self {
        Self {
            address: self.address.clone(),
            state: self.state,
            last_updated: self.last_updated,
            payload: Vec::new(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node{{address: {}, state: {}, payload: {}, last_updated: ",
            self.address,
            self.state,
            String::from_utf8_lossy(&self.payload)
        )?;
        match self.last_updated_at() {
            Some(at) => write!(f, "{}}}", at.to_rfc3339()),
            None => write!(f, "never}}"),
        }
    }
}

/// Current time in microseconds since the Unix epoch
pub fn now_micros() -> u64 {
    u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_never_observed() {
        let node = Node::seed("127.0.0.1:7946");
        assert_eq!(node.state, NodeState::Alive);
        assert_eq!(node.last_updated, 0);
        assert!(node.payload.is_empty());
        assert!(node.last_updated_at().is_none());
        assert!(node.to_string().ends_with("last_updated: never}"));
    }

    #[test]
    fn test_touch_is_strictly_monotonic() {
        let mut node = Node::alive("127.0.0.1:7946", b"p".to_vec());
        // Pretend the clock is far in the future
        node.last_updated = now_micros() + 60_000_000;
        let before = node.last_updated;
        node.touch();
        assert_eq!(node.last_updated, before + 1);

        let mut seeded = Node::seed("127.0.0.1:7947");
        seeded.touch();
        assert!(seeded.last_updated > 0);
        assert!(seeded.last_updated_at().is_some());
    }

    #[test]
    fn test_state_order_and_display() {
        assert!(NodeState::Alive < NodeState::Suspected);
        assert!(NodeState::Suspected < NodeState::Dead);
        assert_eq!(NodeState::Dead.to_string(), "dead");
        assert_eq!(
            serde_json::to_string(&NodeState::Suspected).unwrap(),
            "\"suspected\""
        );
    }
}

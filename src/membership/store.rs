//! Membership store
//!
//! Owns every `Node` record known to one gossip engine. All access goes
//! through a single reader-writer lock; callers only ever see clones.
use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::node::Node;

/// What one merge batch did to the store
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub ignored: usize,
}

impl MergeOutcome {
    /// True when the batch changed at least one record
    pub fn changed(&self) -> bool {
        self.inserted + self.updated > 0
    }
}

/// Concurrent table of members keyed by address, with last-write-wins merge
#[derive(Debug, Default)]
pub struct Membership {
    nodes: RwLock<HashMap<String, Node>>,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or unconditionally overwrite the record at `node.address`
    pub fn add(&self, node: Node) {
        self.nodes.write().insert(node.address.clone(), node);
    }

    /// Reconcile a batch of incoming records, in order, under one write lock
    pub fn merge(&self, incoming: Vec<Node>) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut nodes = self.nodes.write();

        for node in incoming {
            match nodes.get_mut(&node.address) {
                None => {
                    debug!("Adding new node: {}", node.address);
                    nodes.insert(node.address.clone(), node);
                    outcome.inserted += 1;
                }
                Some(existing) if node.last_updated <= existing.last_updated => {
                    debug!(
                        "Ignoring stale record for {}: incoming {} <= local {}",
                        node.address, node.last_updated, existing.last_updated
                    );
                    outcome.ignored += 1;
                }
                Some(existing) => {
                    debug!(
                        "Updating node {}: {} -> {} (payload {})",
                        node.address,
                        existing.last_updated,
                        node.last_updated,
                        if node.payload.is_empty() {
                            "preserved"
                        } else {
                            "replaced"
                        }
                    );
                    existing.state = node.state;
                    existing.last_updated = node.last_updated;
                    if !node.payload.is_empty() {
                        existing.payload = node.payload;
                    }
                    outcome.updated += 1;
                }
            }
        }

        outcome
    }

    pub fn get(&self, address: &str) -> Option<Node> {
        self.nodes.read().get(address).cloned()
    }

    /// Owned snapshot of every record
    pub fn all(&self) -> Vec<Node> {
        self.nodes.read().values().cloned().collect()
    }

    /// Addresses of every record, without cloning payloads
    pub fn addresses(&self) -> Vec<String> {
        self.nodes.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::membership::node::{now_micros, NodeState};

    const ADDR_1: &str = "127.0.0.1:8080";
    const ADDR_2: &str = "127.0.0.1:8081";

    fn node_at(address: &str, last_updated: u64, payload: &str) -> Node {
        Node {
            address: address.to_string(),
            state: NodeState::Alive,
            last_updated,
            payload: payload.as_bytes().to_vec(),
        }
    }

    fn sorted(mut nodes: Vec<Node>) -> Vec<Node> {
        nodes.sort_by(|a, b| a.address.cmp(&b.address));
        nodes
    }

    #[test]
    fn test_add_and_get() {
        let membership = Membership::new();
        let node = node_at(ADDR_1, now_micros(), "test-payload");
        membership.add(node.clone());

        assert_eq!(membership.get(ADDR_1), Some(node));
        assert!(membership.get(ADDR_2).is_none());
        assert_eq!(membership.len(), 1);
    }

    #[test]
    fn test_add_overwrites_unconditionally() {
        let membership = Membership::new();
        membership.add(node_at(ADDR_1, 100, "new"));
        membership.add(node_at(ADDR_1, 5, "old"));

        let stored = membership.get(ADDR_1).unwrap();
        assert_eq!(stored.last_updated, 5);
        assert_eq!(stored.payload, b"old");
    }

    #[test]
    fn test_merge_mixed_batch() {
        let membership = Membership::new();
        membership.add(node_at(ADDR_1, 1_000, "payload1"));

        let outcome = membership.merge(vec![
            node_at(ADDR_1, 2_000, "payload1-updated"),
            node_at(ADDR_1, 500, "payload1-old"),
            node_at(ADDR_2, 1_000, "payload2"),
        ]);

        assert_eq!(
            outcome,
            MergeOutcome {
                inserted: 1,
                updated: 1,
                ignored: 1
            }
        );
        let node1 = membership.get(ADDR_1).unwrap();
        assert_eq!(node1.last_updated, 2_000);
        assert_eq!(node1.payload, b"payload1-updated");
        assert_eq!(membership.get(ADDR_2).unwrap().payload, b"payload2");
    }

    #[test]
    fn test_merge_ties_keep_local() {
        let membership = Membership::new();
        membership.add(node_at(ADDR_1, 1_000, "local"));

        let outcome = membership.merge(vec![node_at(ADDR_1, 1_000, "remote")]);

        assert!(!outcome.changed());
        assert_eq!(membership.get(ADDR_1).unwrap().payload, b"local");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let once = Membership::new();
        let twice = Membership::new();
        let node = node_at(ADDR_1, 42, "X");

        once.merge(vec![node.clone()]);
        twice.merge(vec![node.clone()]);
        let second = twice.merge(vec![node]);

        assert_eq!(second.ignored, 1);
        assert_eq!(sorted(once.all()), sorted(twice.all()));
    }

    #[test]
    fn test_merge_order_independent() {
        let older = node_at(ADDR_1, 10, "a");
        let newer = node_at(ADDR_1, 20, "b");

        let forward = Membership::new();
        forward.merge(vec![older.clone()]);
        forward.merge(vec![newer.clone()]);

        let backward = Membership::new();
        backward.merge(vec![newer.clone()]);
        backward.merge(vec![older]);

        assert_eq!(forward.get(ADDR_1), Some(newer.clone()));
        assert_eq!(backward.get(ADDR_1), Some(newer));
    }

    #[test]
    fn test_empty_newer_payload_keeps_stored_payload() {
        let older = node_at(ADDR_1, 10, "a");
        let newer = node_at(ADDR_1, 20, "");

        let forward = Membership::new();
        forward.merge(vec![older.clone()]);
        forward.merge(vec![newer.clone()]);
        let stored = forward.get(ADDR_1).unwrap();
        assert_eq!(stored.last_updated, 20);
        assert_eq!(stored.payload, b"a");

        // Newer-first never sees the older payload, so nothing to preserve
        let backward = Membership::new();
        backward.merge(vec![newer]);
        backward.merge(vec![older]);
        let stored = backward.get(ADDR_1).unwrap();
        assert_eq!(stored.last_updated, 20);
        assert!(stored.payload.is_empty());
    }

    #[test]
    fn test_payload_preserved_by_empty_heartbeat() {
        let membership = Membership::new();
        membership.add(node_at(ADDR_1, 1_000, "X"));

        let mut beat = node_at(ADDR_1, 2_000, "");
        beat.state = NodeState::Suspected;
        let outcome = membership.merge(vec![beat]);

        assert_eq!(outcome.updated, 1);
        let stored = membership.get(ADDR_1).unwrap();
        assert_eq!(stored.payload, b"X");
        assert_eq!(stored.last_updated, 2_000);
        assert_eq!(stored.state, NodeState::Suspected);
    }

    #[test]
    fn test_seeded_peer_is_replaced_by_any_observation() {
        let membership = Membership::new();
        membership.add(Node::seed(ADDR_1));

        membership.merge(vec![node_at(ADDR_1, 1, "hello")]);
        assert_eq!(membership.get(ADDR_1).unwrap().payload, b"hello");
    }

    #[test]
    fn test_all_is_a_snapshot() {
        let membership = Membership::new();
        membership.add(node_at(ADDR_1, 1, "X"));

        let mut snapshot = membership.all();
        snapshot[0].payload = b"mutated".to_vec();
        snapshot.push(node_at(ADDR_2, 1, "Y"));

        assert_eq!(membership.len(), 1);
        assert_eq!(membership.get(ADDR_1).unwrap().payload, b"X");
    }

    #[test]
    fn test_concurrent_merges_converge() {
        let membership = Arc::new(Membership::new());
        let handles: Vec<_> = (0..8u64)
            .map(|i| {
                let membership = Arc::clone(&membership);
                std::thread::spawn(move || {
                    for ts in 1..=100u64 {
                        membership.merge(vec![node_at(ADDR_1, ts * 8 + i, "p")]);
                        let _ = membership.all();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(membership.get(ADDR_1).unwrap().last_updated, 100 * 8 + 7);
    }
}

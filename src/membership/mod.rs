//! Cluster membership: member records and the last-write-wins store
pub mod node;
pub mod store;

pub use node::{now_micros, Node, NodeState};
pub use store::{Membership, MergeOutcome};

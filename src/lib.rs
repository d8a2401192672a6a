pub mod cli;
pub mod error;
pub mod gossip;
pub mod membership;
pub mod settings;
pub mod transport;

pub use error::{Result, RumorError};
pub use gossip::Gossiper;
pub use membership::{Membership, Node, NodeState};

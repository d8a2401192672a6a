//! Epidemic gossip: wire messages and the engine that exchanges them
pub mod gossiper;
pub mod messages;

pub use gossiper::Gossiper;
pub use messages::{decode_nodes, encode_nodes, Message, MessageType};

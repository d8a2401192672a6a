//! rumor node settings
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:7946";
pub const DEFAULT_PING_INTERVAL_MS: &str = "1000";
pub const DEFAULT_SYNC_INTERVAL_MS: &str = "5000";

/// What the listen loop does with a node list carried by a Ping
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PingHandling {
    /// Merge it exactly like a Sync snapshot
    #[default]
    Merge,
    /// Treat Ping as a bare liveness probe and ignore its payload
    LivenessOnly,
}

impl std::fmt::Display for PingHandling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PingHandling::Merge => write!(f, "merge"),
            PingHandling::LivenessOnly => write!(f, "liveness-only"),
        }
    }
}

impl std::str::FromStr for PingHandling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "merge" => Ok(PingHandling::Merge),
            "liveness-only" | "liveness_only" | "liveness" => Ok(PingHandling::LivenessOnly),
            _ => Err(format!("Invalid ping handling: {}", s)),
        }
    }
}

/// Gossip engine timing and policy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GossipConfig {
    /// How often a liveness ping goes to one random peer
    pub ping_interval: Duration,
    /// How often the full membership goes to one random peer
    pub sync_interval: Duration,
    pub ping_handling: PingHandling,
}

impl GossipConfig {
    /// Both intervals must be positive
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.ping_interval.is_zero() {
            return Err(crate::config_error!("ping interval must be positive"));
        }
        if self.sync_interval.is_zero() {
            return Err(crate::config_error!("sync interval must be positive"));
        }
        Ok(())
    }
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(1),
            sync_interval: Duration::from_secs(5),
            ping_handling: PingHandling::Merge,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Settings {
    // UDP listen address for gossip. Also the node's gossiped identity, so
    // it must be a specific interface address, not a wildcard.
    pub listen_address: String,

    // Peers seeded into the membership at startup
    pub peers: Vec<String>,

    pub gossip: GossipConfig,

    // Symmetric key; selects the encrypting transport when present
    pub encryption_key: Option<Vec<u8>>,

    // Initial payload for the local node
    pub payload: Option<Vec<u8>>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            peers: Vec::new(),
            gossip: GossipConfig::default(),
            encryption_key: None,
            payload: None,
        }
    }
}

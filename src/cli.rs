//! CLI for this application
//!
use std::time::Duration;

use crate::error::Result;
use crate::settings;

pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Debug, clap::Parser)]
#[clap(name = APP_NAME, version = APP_VERSION, about = "Run one gossip membership node")]
pub struct Cli {
    // UDP listen address for gossip
    #[clap(
        long,
        default_value = settings::DEFAULT_LISTEN_ADDRESS,
        env("RUMOR_LISTEN_ADDRESS"),
        help = "host:port to bind the gossip socket to"
    )]
    pub listen_address: String,

    // Seed peers
    #[clap(
        long,
        env("RUMOR_PEERS"),
        value_delimiter = ',',
        help = "Comma separated host:port peers to seed (e.g., 10.0.0.2:7946,10.0.0.3:7946)"
    )]
    pub peers: Vec<String>,

    #[clap(
        long,
        default_value = settings::DEFAULT_PING_INTERVAL_MS,
        env("RUMOR_PING_INTERVAL_MS"),
        help = "Milliseconds between liveness pings"
    )]
    pub ping_interval_ms: u64,

    #[clap(
        long,
        default_value = settings::DEFAULT_SYNC_INTERVAL_MS,
        env("RUMOR_SYNC_INTERVAL_MS"),
        help = "Milliseconds between full membership syncs"
    )]
    pub sync_interval_ms: u64,

    #[clap(
        long,
        default_value = "merge",
        env("RUMOR_PING_HANDLING"),
        help = "ping-handling: 'merge' or 'liveness-only'"
    )]
    pub ping_handling: settings::PingHandling,

    // Symmetric key, hex encoded
    #[clap(
        long,
        env("RUMOR_KEY"),
        hide_env_values = true,
        help = "Hex encoded 16, 24, or 32 byte key; enables AES-GCM encryption"
    )]
    pub key: Option<String>,

    #[clap(long, env("RUMOR_PAYLOAD"), help = "Payload to advertise for this node")]
    pub payload: Option<String>,

    #[clap(
        long,
        default_value = "5000",
        env("RUMOR_REPORT_INTERVAL_MS"),
        help = "Milliseconds between membership reports"
    )]
    pub report_interval_ms: u64,

    #[clap(long, help = "Print membership reports as JSON lines")]
    pub json: bool,
}

impl Cli {
    pub fn into_settings(self) -> Result<settings::Settings> {
        let encryption_key = self
            .key
            .map(|key| {
                hex::decode(key.trim())
                    .map_err(|e| crate::config_error!("Invalid hex key: {}", e))
            })
            .transpose()?;

        let gossip = settings::GossipConfig {
            ping_interval: Duration::from_millis(self.ping_interval_ms),
            sync_interval: Duration::from_millis(self.sync_interval_ms),
            ping_handling: self.ping_handling,
        };
        gossip.validate()?;

        Ok(settings::Settings {
            listen_address: self.listen_address,
            peers: self.peers,
            gossip,
            encryption_key,
            payload: self.payload.map(String::into_bytes),
        })
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms.max(1))
    }
}

//! Gossip engine
//!
//! A `Gossiper` owns the local node, the membership store and a transport,
//! and runs three independent loops once started:
//!
//! - **listen**: decode inbound frames and merge the records they carry
//! - **ping**: every `ping_interval`, send a bare liveness ping to one
//!   random peer
//! - **sync**: every `sync_interval`, send the full membership snapshot to
//!   one random peer
//!
//! The loops share one cancellation token. `stop()` cancels it and waits for
//! all three to exit, so no I/O happens after it returns.
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::seq::SliceRandom;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use super::messages::{Message, MessageType};
use crate::error::Result;
use crate::gossip_error;
use crate::membership::{Membership, MergeOutcome, Node};
use crate::settings::{GossipConfig, PingHandling, Settings};
use crate::transport::{build_transport, resolve_address, Frames, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// State shared between the engine handle and its loops
struct GossipState {
    address: String,
    local: Mutex<Node>,
    membership: Membership,
    transport: Arc<dyn Transport>,
    config: GossipConfig,
}

/// Epidemic membership engine
pub struct Gossiper {
    state: Arc<GossipState>,
    lifecycle: Mutex<Lifecycle>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl std::fmt::Debug for Gossiper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gossiper")
            .field("address", &self.state.address)
            .field("lifecycle", &*self.lifecycle.lock())
            .field("members", &self.state.membership.len())
            .field("config", &self.state.config)
            .finish()
    }
}

impl Gossiper {
    /// Create an engine for the node at `listen_address`.
    ///
    /// The address is resolved once and becomes the local node's identity,
    /// so it must be the address peers can reach `transport` on. Wildcard
    /// addresses such as `0.0.0.0` are rejected for that reason.
    pub async fn new(
        listen_address: &str,
        transport: Arc<dyn Transport>,
        config: GossipConfig,
    ) -> Result<Self> {
        config.validate()?;
        let resolved = resolve_address(listen_address)
            .await
            .map_err(|e| crate::config_error!("Invalid listen address {}: {}", listen_address, e))?;
        if resolved.ip().is_unspecified() {
            return Err(crate::config_error!(
                "Listen address {} is not routable; bind a specific interface address",
                listen_address
            ));
        }
        let address = resolved.to_string();

        let local = Node::alive(address.clone(), Vec::new());
        let membership = Membership::new();
        membership.add(local.clone());

        info!(
            "[{}] Created gossiper (ping every {:?}, sync every {:?}, ping handling: {})",
            address, config.ping_interval, config.sync_interval, config.ping_handling
        );

        Ok(Self {
            state: Arc::new(GossipState {
                address,
                local: Mutex::new(local),
                membership,
                transport,
                config,
            }),
            lifecycle: Mutex::new(Lifecycle::Created),
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Bind the transport described by `settings` and build an engine on it,
    /// seeded with the configured peers and payload.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let (transport, local_addr) = build_transport(settings).await?;

        match Self::seeded(settings, Arc::clone(&transport), &local_addr.to_string()).await {
            Ok(gossiper) => Ok(gossiper),
            Err(e) => {
                transport.stop().await;
                Err(e)
            }
        }
    }

    async fn seeded(
        settings: &Settings,
        transport: Arc<dyn Transport>,
        local_addr: &str,
    ) -> Result<Self> {
        let gossiper = Self::new(local_addr, transport, settings.gossip.clone()).await?;
        for peer in &settings.peers {
            gossiper
                .add_node(peer)
                .await
                .map_err(|e| crate::config_error!("Invalid peer address {}: {}", peer, e))?;
        }
        if let Some(payload) = &settings.payload {
            gossiper.set_payload(payload.clone());
        }
        Ok(gossiper)
    }

    /// Seed a peer by address. The local address and already known peers
    /// are left untouched.
    pub async fn add_node(&self, address: &str) -> Result<()> {
        let address = resolve_address(address).await?.to_string();
        if address == self.state.address {
            debug!("[{}] Not seeding our own address", self.state.address);
            return Ok(());
        }
        if self.state.membership.get(&address).is_some() {
            debug!("[{}] Peer {} already known", self.state.address, address);
            return Ok(());
        }

        debug!("[{}] Seeding peer {}", self.state.address, address);
        self.state.membership.add(Node::seed(address));
        Ok(())
    }

    /// Replace the local payload and stamp the change
    pub fn set_payload(&self, payload: impl Into<Vec<u8>>) {
        let mut local = self.state.local.lock();
        local.payload = payload.into();
        local.touch();
        self.state.membership.add(local.clone());
    }

    /// Snapshot of every known member, including the local node
    pub fn members(&self) -> Vec<Node> {
        self.state.membership.all()
    }

    pub fn member(&self, address: &str) -> Option<Node> {
        self.state.membership.get(address)
    }

    pub fn local_address(&self) -> &str {
        &self.state.address
    }

    pub fn local_node(&self) -> Node {
        self.state.local.lock().clone()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.state.transport
    }

    pub fn is_running(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Running
    }

    /// Launch the listen, ping and sync loops.
    ///
    /// An engine starts once; starting it again, or after `stop()`, fails.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Running => return Err(gossip_error!("gossiper is already running")),
            Lifecycle::Stopped => return Err(gossip_error!("gossiper cannot be restarted")),
        }

        let frames = self.state.transport.subscribe()?;
        let state = &self.state;
        self.tracker.spawn(
            Arc::clone(state).listen_loop(frames, self.shutdown.clone()),
        );
        self.tracker.spawn(Arc::clone(state).ping_loop(self.shutdown.clone()));
        self.tracker.spawn(Arc::clone(state).sync_loop(self.shutdown.clone()));
        self.tracker.close();

        *lifecycle = Lifecycle::Running;
        info!("[{}] Gossiper started", self.state.address);
        Ok(())
    }

    /// Cancel the loops and wait until every one of them has exited.
    ///
    /// Does not stop the transport.
    pub async fn stop(&self) {
        let previous = std::mem::replace(&mut *self.lifecycle.lock(), Lifecycle::Stopped);

        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        if previous == Lifecycle::Running {
            info!("[{}] Gossiper stopped", self.state.address);
        }
    }

    /// Stop the engine, then its transport
    pub async fn shutdown(&self) {
        self.stop().await;
        self.state.transport.stop().await;
    }

    /// Decode one inbound frame and merge what it carries
    pub fn handle_frame(&self, frame: &[u8]) -> Result<MergeOutcome> {
        self.state.handle_frame(frame)
    }
}

impl Drop for Gossiper {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn ticker(period: Duration) -> time::Interval {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl GossipState {
    async fn listen_loop(self: Arc<Self>, mut frames: Frames, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = frames.recv() => {
                    let Some(frame) = frame else {
                        info!("[{}] Transport stream closed, listen loop exiting", self.address);
                        break;
                    };
                    match self.handle_frame(&frame) {
                        Ok(outcome) if outcome.changed() => debug!(
                            "[{}] Merged frame: {} new, {} updated, {} ignored",
                            self.address, outcome.inserted, outcome.updated, outcome.ignored
                        ),
                        Ok(_) => trace!("[{}] Frame changed nothing", self.address),
                        Err(e) => debug!(
                            "[{}] Dropping {} byte frame: {}",
                            self.address,
                            frame.len(),
                            e
                        ),
                    }
                }
            }
        }
        debug!("[{}] Listen loop exited", self.address);
    }

    async fn ping_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = ticker(self.config.ping_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.send_ping().await {
                        warn!("[{}] Ping failed ({}): {}", self.address, e.error_type(), e);
                    }
                }
            }
        }
        debug!("[{}] Ping loop exited", self.address);
    }

    async fn sync_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let mut ticker = ticker(self.config.sync_interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.send_sync().await {
                        warn!("[{}] Sync failed ({}): {}", self.address, e.error_type(), e);
                    }
                }
            }
        }
        debug!("[{}] Sync loop exited", self.address);
    }

    fn handle_frame(&self, frame: &[u8]) -> Result<MergeOutcome> {
        let message = Message::decode(frame)?;
        match (message.message_type, self.config.ping_handling) {
            (MessageType::Ping, PingHandling::LivenessOnly) => {
                trace!("[{}] Ping received", self.address);
                Ok(MergeOutcome::default())
            }
            (MessageType::Ping, PingHandling::Merge) | (MessageType::Sync, _) => {
                let nodes = message.nodes()?;
                Ok(self.membership.merge(nodes))
            }
        }
    }

    /// Bare liveness ping to one random peer.
    ///
    /// Carries no records and leaves the local stamp alone: a fresher stamp
    /// without the payload would shadow relayed copies of a newer payload.
    async fn send_ping(&self) -> Result<()> {
        let Some(peer) = self.pick_peer() else {
            trace!("[{}] No peers to ping", self.address);
            return Ok(());
        };
        self.send(&Message::ping(), &peer).await
    }

    /// Full membership snapshot to one random peer
    async fn send_sync(&self) -> Result<()> {
        self.refresh_local();
        let Some(peer) = self.pick_peer() else {
            trace!("[{}] No peers to sync with", self.address);
            return Ok(());
        };
        let snapshot = self.membership.all();
        let message = Message::sync(&snapshot)?;
        debug!(
            "[{}] Syncing {} members to {}",
            self.address,
            snapshot.len(),
            peer
        );
        self.send(&message, &peer).await
    }

    async fn send(&self, message: &Message, peer: &str) -> Result<()> {
        let data = message.encode()?;
        self.transport.write(&data, peer).await
    }

    /// Stamp the local node with a fresh timestamp and store it
    fn refresh_local(&self) -> Node {
        let mut local = self.local.lock();
        // A previous incarnation on this address may have gossiped a later stamp
        if let Some(seen) = self.membership.get(&self.address) {
            local.last_updated = local.last_updated.max(seen.last_updated);
        }
        local.touch();
        self.membership.add(local.clone());
        local.clone()
    }

    /// Uniform choice over every known address except our own
    fn pick_peer(&self) -> Option<String> {
        let peers: Vec<String> = self
            .membership
            .addresses()
            .into_iter()
            .filter(|address| *address != self.address)
            .collect();
        peers.choose(&mut rand::thread_rng()).cloned()
    }
}

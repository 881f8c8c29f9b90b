//! Peer registry — hosts recently seen via discovery.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Tracked state for a discovered peer, keyed by source IP.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub device_name: String,
    pub ip: IpAddr,
    /// Port of the peer's HTTP session service.
    pub api_port: u16,
    /// Last time any announcement arrived from this peer.
    pub last_seen: Instant,
}

impl PeerEntry {
    pub fn last_seen_secs(&self) -> u64 {
        self.last_seen.elapsed().as_secs()
    }
}

/// The peer registry — shared between the discovery tasks and API handlers.
pub type PeerRegistry = Arc<DashMap<IpAddr, PeerEntry>>;

pub fn new_peer_registry() -> PeerRegistry {
    Arc::new(DashMap::new())
}

/// Upsert a peer record. Returns true when this is the first sighting of the
/// IP, so callers can fire their new-peer notification exactly once.
pub fn upsert_peer(
    registry: &PeerRegistry,
    device_name: String,
    ip: IpAddr,
    api_port: u16,
) -> bool {
    let mut is_new = false;
    registry
        .entry(ip)
        .and_modify(|entry| {
            entry.device_name = device_name.clone();
            entry.api_port = api_port;
            entry.last_seen = Instant::now();
        })
        .or_insert_with(|| {
            is_new = true;
            PeerEntry {
                device_name,
                ip,
                api_port,
                last_seen: Instant::now(),
            }
        });
    is_new
}

/// Evict peers silent for longer than `timeout`, then return the survivors.
pub fn get_peers(registry: &PeerRegistry, timeout: Duration) -> Vec<PeerEntry> {
    registry.retain(|_, entry| entry.last_seen.elapsed() <= timeout);
    registry.iter().map(|entry| entry.value().clone()).collect()
}

/// Look up a live peer by its announced device name.
pub fn find_peer_by_name(
    registry: &PeerRegistry,
    timeout: Duration,
    device_name: &str,
) -> Option<PeerEntry> {
    get_peers(registry, timeout)
        .into_iter()
        .find(|peer| peer.device_name == device_name)
}

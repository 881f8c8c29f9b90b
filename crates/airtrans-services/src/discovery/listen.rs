//! Discovery listener — populates the peer registry.

use std::net::IpAddr;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;

use crate::peer::{upsert_peer, PeerEntry, PeerRegistry};

use super::{Announcement, LocalIdentity, DISCOVERY_PROBE, PEER_ANNOUNCEMENT};

/// Listen for probes and announcements on the discovery socket.
///
/// Probes get a unicast announcement reply to the sender's IP on
/// `reply_port`. Announcements upsert the registry keyed by their source IP;
/// the first sighting of a new IP is pushed to `new_peer_tx`.
///
/// Runs forever — cancel by dropping the task handle.
pub async fn listener_loop(
    socket: UdpSocket,
    registry: PeerRegistry,
    identity: LocalIdentity,
    reply_port: u16,
    new_peer_tx: Option<UnboundedSender<PeerEntry>>,
) {
    let mut buf = vec![0u8; 2048];
    tracing::info!(
        device_name = %identity.device_name,
        "discovery listener starting"
    );

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "recv_from failed");
                continue;
            }
        };

        let message = match std::str::from_utf8(&buf[..len]) {
            Ok(m) => m,
            Err(_) => {
                tracing::trace!(%src, "non-UTF-8 datagram ignored");
                continue;
            }
        };

        if let Some(probe_name) = message.strip_prefix(DISCOVERY_PROBE) {
            // Our own probes come back on broadcast sockets.
            if probe_name.trim_start_matches(':') == identity.device_name {
                continue;
            }
            reply_to_probe(&socket, &identity, src.ip(), reply_port).await;
        } else if let Ok(announcement) = serde_json::from_str::<Announcement>(message) {
            if announcement.kind != PEER_ANNOUNCEMENT {
                continue;
            }
            handle_announcement(&registry, &identity, announcement, src.ip(), &new_peer_tx);
        } else {
            tracing::trace!(%src, "unrecognised discovery datagram");
        }
    }
}

async fn reply_to_probe(
    socket: &UdpSocket,
    identity: &LocalIdentity,
    peer_ip: IpAddr,
    reply_port: u16,
) {
    let reply = Announcement::for_identity(identity).to_json();
    match socket.send_to(reply.as_bytes(), (peer_ip, reply_port)).await {
        Ok(_) => tracing::debug!(%peer_ip, "replied to discovery probe"),
        Err(e) => tracing::warn!(%peer_ip, error = %e, "probe reply failed"),
    }
}

fn handle_announcement(
    registry: &PeerRegistry,
    identity: &LocalIdentity,
    announcement: Announcement,
    src_ip: IpAddr,
    new_peer_tx: &Option<UnboundedSender<PeerEntry>>,
) {
    // Ignore our own announcements.
    if announcement.device_name == identity.device_name && announcement.ip == identity.ip {
        return;
    }

    // Records key on the observed source address, not the self-reported one.
    let is_new = upsert_peer(
        registry,
        announcement.device_name.clone(),
        src_ip,
        announcement.api_port,
    );

    if is_new {
        tracing::info!(
            device_name = %announcement.device_name,
            ip = %src_ip,
            api_port = announcement.api_port,
            "discovered peer"
        );
        if let Some(tx) = new_peer_tx {
            if let Some(entry) = registry.get(&src_ip) {
                let _ = tx.send(entry.value().clone());
            }
        }
    }
}

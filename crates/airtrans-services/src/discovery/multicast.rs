//! Multicast discovery variant.
//!
//! Some networks drop the IPv4 limited broadcast; this variant announces to
//! the 224.0.0.251 group instead. Announcement-only — there is no
//! probe/reply handshake — with identical upsert semantics at the receiver.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, UdpSocket as StdUdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time;

use crate::peer::{upsert_peer, PeerEntry, PeerRegistry};

use super::{Announcement, LocalIdentity, PEER_ANNOUNCEMENT};

/// UDP socket for sending to the multicast group. TTL 2 keeps datagrams on
/// the local network.
pub fn sender_socket() -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_multicast_ttl_v4(2)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;
    UdpSocket::from_std(socket.into())
}

/// UDP socket joined to the multicast group on the given port.
pub fn listener_socket(group: Ipv4Addr, port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
    socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
    UdpSocket::from_std(socket.into())
}

/// Announce presence to the multicast group on a regular interval.
///
/// Runs forever — cancel by dropping the task handle.
pub async fn announce_loop(
    socket: UdpSocket,
    group: Ipv4Addr,
    port: u16,
    identity: LocalIdentity,
    interval: Duration,
) {
    let dest = SocketAddrV4::new(group, port);
    let mut ticker = time::interval(interval);
    tracing::info!(%dest, "multicast announcer starting");

    loop {
        ticker.tick().await;
        let announcement = Announcement::for_identity(&identity).to_json();
        match socket.send_to(announcement.as_bytes(), dest).await {
            Ok(n) => tracing::trace!(bytes = n, "multicast announcement sent"),
            Err(e) => tracing::warn!(error = %e, "multicast announce failed"),
        }
    }
}

/// Receive multicast announcements and upsert the peer registry.
///
/// Runs forever — cancel by dropping the task handle.
pub async fn listener_loop(
    socket: UdpSocket,
    registry: PeerRegistry,
    identity: LocalIdentity,
    new_peer_tx: Option<UnboundedSender<PeerEntry>>,
) {
    let mut buf = vec![0u8; 2048];
    tracing::info!("multicast listener starting");

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "multicast recv failed");
                continue;
            }
        };

        let announcement: Announcement = match serde_json::from_slice(&buf[..len]) {
            Ok(a) => a,
            Err(_) => {
                tracing::trace!(%src, "malformed multicast datagram");
                continue;
            }
        };
        if announcement.kind != PEER_ANNOUNCEMENT {
            continue;
        }
        if announcement.device_name == identity.device_name && announcement.ip == identity.ip {
            continue;
        }

        let src_ip: IpAddr = src.ip();
        let is_new = upsert_peer(
            &registry,
            announcement.device_name.clone(),
            src_ip,
            announcement.api_port,
        );
        if is_new {
            tracing::info!(
                device_name = %announcement.device_name,
                ip = %src_ip,
                "discovered peer via multicast"
            );
            if let Some(tx) = &new_peer_tx {
                if let Some(entry) = registry.get(&src_ip) {
                    let _ = tx.send(entry.value().clone());
                }
            }
        }
    }
}

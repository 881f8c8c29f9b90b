//! Peer discovery — UDP announcements on the local broadcast domain.
//!
//! Two datagram kinds share the discovery port (default 37020):
//!
//! - probe: ASCII `AIRTRANS_DISCOVERY:<device_name>`; recipients reply with a
//!   unicast announcement to the probe's source IP.
//! - announcement: UTF-8 JSON `{"type":"AIRTRANS_PEER",...}`; recipients
//!   upsert the peer registry keyed by source IP.
//!
//! Delivery is best-effort. No ordering, no duplicate suppression beyond
//! last-writer-wins per IP. A multicast variant (224.0.0.251:37021,
//! announcement only) is available for networks that suppress broadcast.
//!
//! The loops take pre-bound sockets: the daemon binds the configured ports,
//! tests bind ephemeral loopback ones.

pub mod announce;
pub mod listen;
pub mod multicast;

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, UdpSocket as StdUdpSocket};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Prefix of a discovery probe datagram.
pub const DISCOVERY_PROBE: &str = "AIRTRANS_DISCOVERY";

/// `type` field of an announcement datagram.
pub const PEER_ANNOUNCEMENT: &str = "AIRTRANS_PEER";

/// What this host announces about itself.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub device_name: String,
    pub ip: IpAddr,
    pub api_port: u16,
}

/// The announcement datagram body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    #[serde(rename = "type")]
    pub kind: String,
    pub device_name: String,
    pub ip: IpAddr,
    pub api_port: u16,
    pub timestamp: f64,
}

impl Announcement {
    pub fn for_identity(identity: &LocalIdentity) -> Self {
        Self {
            kind: PEER_ANNOUNCEMENT.to_string(),
            device_name: identity.device_name.clone(),
            ip: identity.ip,
            api_port: identity.api_port,
            timestamp: unix_now(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("announcement serializes")
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Best-effort local address detection: connect a UDP socket outward (no
/// packet is sent) and read the chosen source address.
pub fn local_ip() -> IpAddr {
    StdUdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// UDP socket for sending limited-broadcast datagrams.
pub fn broadcast_socket() -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())?;
    UdpSocket::from_std(socket.into())
}

/// UDP socket bound to the discovery port — receives probes, broadcast
/// announcements, and unicast replies alike.
pub fn listener_socket(port: u16) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;
    UdpSocket::from_std(socket.into())
}

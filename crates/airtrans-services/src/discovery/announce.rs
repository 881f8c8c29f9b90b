//! Periodic presence announcements.
//!
//! Every interval, two datagrams go to the destination (normally
//! `255.255.255.255:<discovery_port>`): a probe asking peers to introduce
//! themselves, and this host's own announcement. Send failures are logged
//! and the loop keeps going.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time;

use super::{Announcement, LocalIdentity, DISCOVERY_PROBE};

/// Broadcast presence on a regular interval.
///
/// Runs forever — cancel by dropping the task handle.
pub async fn announce_loop(
    socket: UdpSocket,
    dest: SocketAddr,
    identity: LocalIdentity,
    interval: Duration,
) {
    let mut ticker = time::interval(interval);
    tracing::info!(
        device_name = %identity.device_name,
        %dest,
        interval_secs = interval.as_secs(),
        "discovery announcer starting"
    );

    loop {
        ticker.tick().await;

        let probe = format!("{DISCOVERY_PROBE}:{}", identity.device_name);
        if let Err(e) = socket.send_to(probe.as_bytes(), dest).await {
            tracing::warn!(error = %e, "probe broadcast failed");
            continue;
        }

        let announcement = Announcement::for_identity(&identity).to_json();
        match socket.send_to(announcement.as_bytes(), dest).await {
            Ok(n) => tracing::trace!(bytes = n, "announcement broadcast"),
            Err(e) => tracing::warn!(error = %e, "announcement broadcast failed"),
        }
    }
}

//! airtransd — AirTrans LAN transfer daemon.
//!
//! Runs peer discovery and the HTTP session service. The parallel transfer
//! engine lives in airtrans-services and is driven by API consumers.

use std::net::{Ipv4Addr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use airtrans_api::ApiState;
use airtrans_core::config::Config;
use airtrans_services::discovery::{self, LocalIdentity};
use airtrans_services::peer::get_peers;
use airtrans_services::{new_peer_registry, new_session_table};

#[tokio::main]
async fn main() -> ExitCode {
    // Initialise tracing — RUST_LOG controls verbosity
    // e.g. RUST_LOG=debug airtransd
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "airtransd exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env();
    config.validate().context("invalid configuration")?;
    config
        .ensure_dirs()
        .context("failed to create data directories")?;
    let config = Arc::new(config);

    let local_ip = discovery::local_ip();
    let identity = LocalIdentity {
        device_name: config.discovery.device_name.clone(),
        ip: local_ip,
        api_port: config.api.port,
    };
    tracing::info!(
        device_name = %identity.device_name,
        ip = %local_ip,
        api_port = config.api.port,
        "airtransd starting"
    );

    let registry = new_peer_registry();
    let sessions = new_session_table();

    // Broadcast discovery pair
    let announce_socket = discovery::broadcast_socket().context("broadcast socket")?;
    let listen_socket = discovery::listener_socket(config.discovery.port)
        .context("discovery listener socket")?;
    let broadcast_dest = SocketAddr::from((Ipv4Addr::BROADCAST, config.discovery.port));
    let interval = Duration::from_secs(config.discovery.interval_secs);

    let (new_peer_tx, mut new_peer_rx) = tokio::sync::mpsc::unbounded_channel();

    let announcer = tokio::spawn(discovery::announce::announce_loop(
        announce_socket,
        broadcast_dest,
        identity.clone(),
        interval,
    ));
    let listener = tokio::spawn(discovery::listen::listener_loop(
        listen_socket,
        registry.clone(),
        identity.clone(),
        config.discovery.port,
        Some(new_peer_tx),
    ));

    // Multicast variant for networks that suppress broadcast
    let mut _multicast_tasks = Vec::new();
    if config.discovery.multicast {
        let group = config.discovery.multicast_group;
        let port = config.discovery.multicast_port;
        let tx_socket = discovery::multicast::sender_socket().context("multicast sender socket")?;
        let rx_socket = discovery::multicast::listener_socket(group, port)
            .context("multicast listener socket")?;
        _multicast_tasks.push(tokio::spawn(discovery::multicast::announce_loop(
            tx_socket,
            group,
            port,
            identity.clone(),
            interval,
        )));
        _multicast_tasks.push(tokio::spawn(discovery::multicast::listener_loop(
            rx_socket,
            registry.clone(),
            identity.clone(),
            None,
        )));
    }

    // Surface first sightings in the log
    let peer_logger = tokio::spawn(async move {
        while let Some(peer) = new_peer_rx.recv().await {
            tracing::info!(
                device_name = %peer.device_name,
                ip = %peer.ip,
                api_port = peer.api_port,
                "peer online"
            );
        }
    });

    // Periodic registry snapshot; get_peers also evicts stale entries
    let peer_snapshot = {
        let registry = registry.clone();
        let peer_timeout = config.peer_timeout();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            loop {
                interval.tick().await;
                let peers = get_peers(&registry, peer_timeout);
                tracing::debug!(peers = peers.len(), "peer registry snapshot");
                for peer in &peers {
                    tracing::debug!(
                        device_name = %peer.device_name,
                        ip = %peer.ip,
                        last_seen_secs = peer.last_seen_secs(),
                        "  peer"
                    );
                }
            }
        })
    };

    let api_state = ApiState {
        sessions,
        config: config.clone(),
        local_ip,
    };
    let api_host = config.api.host.clone();
    let api_port = config.api.port;
    let api = tokio::spawn(async move { airtrans_api::serve(api_state, &api_host, api_port).await });

    // Wait for any task to finish (they run forever, so this catches
    // failures) or for an interrupt.
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
            anyhow::bail!("interrupted")
        }
        r = api => match r {
            Ok(Ok(())) => anyhow::bail!("session service exited"),
            Ok(Err(e)) => Err(e).context("session service failed"),
            Err(e) => Err(e).context("session service task panicked"),
        },
        r = announcer => { anyhow::bail!("announcer task exited: {r:?}") }
        r = listener => { anyhow::bail!("listener task exited: {r:?}") }
        r = peer_logger => { anyhow::bail!("peer logger exited: {r:?}") }
        r = peer_snapshot => { anyhow::bail!("registry snapshot task exited: {r:?}") }
    }
}

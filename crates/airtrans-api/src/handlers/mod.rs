//! HTTP API handlers — session lifecycle, progress, and the QR surface.

pub mod progress;
pub mod qr;
pub mod sessions;
pub mod status;

use std::net::IpAddr;
use std::sync::Arc;

use axum::http::StatusCode;

use airtrans_core::config::Config;
use airtrans_services::SessionTable;

#[derive(Clone)]
pub struct ApiState {
    pub sessions: SessionTable,
    pub config: Arc<Config>,
    /// Address advertised in freshly minted descriptors.
    pub local_ip: IpAddr,
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn session_not_found() -> (StatusCode, String) {
    (StatusCode::NOT_FOUND, "session not found".to_string())
}

fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

// Re-export handler functions for use in router setup.
pub use progress::{handle_complete, handle_get_progress, handle_update_progress};
pub use qr::{handle_qr, handle_scan_qr};
pub use sessions::{
    handle_create_session, handle_delete_session, handle_get_session, handle_join_session,
    handle_list_sessions,
};
pub use status::handle_health;

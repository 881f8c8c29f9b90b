//! airtrans-api — the HTTP control plane for transfer sessions.
//!
//! Coordination surface only: descriptors are minted, joined, observed, and
//! verified here, but no payload bytes traverse this service. The real
//! transfer runs on the data ports the descriptor advertises.

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

pub use handlers::ApiState;

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::handle_health))
        .route("/create-session", post(handlers::handle_create_session))
        .route("/qr/{session_id}", get(handlers::handle_qr))
        .route("/join-session", post(handlers::handle_join_session))
        .route("/progress/{session_id}", get(handlers::handle_get_progress))
        .route(
            "/update-progress/{session_id}",
            post(handlers::handle_update_progress),
        )
        .route("/complete/{session_id}", post(handlers::handle_complete))
        .route("/sessions", get(handlers::handle_list_sessions))
        .route(
            "/session/{session_id}",
            get(handlers::handle_get_session).delete(handlers::handle_delete_session),
        )
        .route("/scan-qr", post(handlers::handle_scan_qr))
        .with_state(state)
        .layer(cors)
}

pub async fn serve(state: ApiState, host: &str, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}")).await?;
    tracing::info!(host, port, "session service listening");
    axum::serve(listener, app).await?;
    Ok(())
}

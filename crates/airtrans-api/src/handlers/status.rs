//! /health — liveness probe.

use axum::Json;
use serde::Serialize;

use airtrans_core::descriptor::PROTOCOL_VERSION;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

pub async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "AirTrans API",
        version: PROTOCOL_VERSION,
    })
}

//! Progress observation, progress reporting, and completion.

use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use airtrans_core::integrity;
use airtrans_services::SessionState;

use super::{internal, session_not_found, ApiState};

// ── /progress/{id} ────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ProgressResponse {
    pub session_id: String,
    pub status: SessionState,
    /// Per-part transferred bytes, indexed by chunk id.
    pub progress: Vec<u64>,
    pub total_transferred: u64,
    pub filesize: u64,
    pub percentage: f64,
    pub num_parts: usize,
}

pub async fn handle_get_progress(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<ProgressResponse>, (StatusCode, String)> {
    let record = state
        .sessions
        .get(&session_id)
        .ok_or_else(session_not_found)?;

    Ok(Json(ProgressResponse {
        session_id,
        status: record.state,
        progress: record.progress.clone(),
        total_transferred: record.total_transferred(),
        filesize: record.descriptor.filesize,
        percentage: (record.percentage() * 100.0).round() / 100.0,
        num_parts: record.descriptor.num_parts,
    }))
}

// ── /update-progress/{id} ─────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct UpdateProgressResponse {
    pub status: &'static str,
}

pub async fn handle_update_progress(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<UpdateProgressResponse>, (StatusCode, String)> {
    let chunk_id = body.get("chunk_id").and_then(|v| v.as_u64());
    let bytes = body.get("bytes_transferred").and_then(|v| v.as_u64());
    let (chunk_id, bytes) = match (chunk_id, bytes) {
        (Some(c), Some(b)) => (c as usize, b),
        _ => {
            return Err((
                StatusCode::BAD_REQUEST,
                "chunk_id and bytes_transferred required".to_string(),
            ))
        }
    };

    let mut record = state
        .sessions
        .get_mut(&session_id)
        .ok_or_else(session_not_found)?;
    if chunk_id >= record.descriptor.num_parts {
        return Err((
            StatusCode::BAD_REQUEST,
            format!(
                "chunk_id {chunk_id} out of range for {} parts",
                record.descriptor.num_parts
            ),
        ));
    }
    record.record_progress(chunk_id, bytes);

    Ok(Json(UpdateProgressResponse { status: "updated" }))
}

// ── /complete/{id} ────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct CompleteResponse {
    pub status: SessionState,
    pub checksum_match: bool,
    pub expected_checksum: String,
}

pub async fn handle_complete(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<CompleteResponse>, (StatusCode, String)> {
    let expected = state
        .sessions
        .get(&session_id)
        .ok_or_else(session_not_found)?
        .descriptor
        .checksum
        .clone();

    let output_path = body.get("output_path").and_then(|v| v.as_str());
    let reported = body.get("checksum").and_then(|v| v.as_str());

    let checksum_match = if let Some(output_path) = output_path {
        let path = PathBuf::from(output_path);
        let algo = state.config.algorithm();
        let actual = tokio::task::spawn_blocking(move || integrity::file_digest(&path, algo))
            .await
            .map_err(internal)?
            .map_err(internal)?;
        integrity::verify(&actual, &expected)
    } else if let Some(reported) = reported {
        integrity::verify(reported, &expected)
    } else {
        return Err((
            StatusCode::BAD_REQUEST,
            "output_path or checksum is required".to_string(),
        ));
    };

    let status = {
        let mut record = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(session_not_found)?;
        record.finish(checksum_match);
        record.state
    };

    tracing::info!(session_id = %session_id, checksum_match, "transfer completion reported");

    Ok(Json(CompleteResponse {
        status,
        checksum_match,
        expected_checksum: expected,
    }))
}

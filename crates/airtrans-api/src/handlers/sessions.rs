//! Session lifecycle handlers — create, join, list, inspect, delete.

use std::net::IpAddr;
use std::path::PathBuf;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use airtrans_core::descriptor::{format_size, TransferDescriptor, MAX_PARTS};
use airtrans_services::{SessionRecord, SessionRole, SessionState};

use super::{internal, session_not_found, ApiState};

// ── /create-session ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub metadata: TransferDescriptor,
    pub qr_code_url: String,
    pub filesize_human: String,
}

pub async fn handle_create_session(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), (StatusCode, String)> {
    let filepath = body
        .get("filepath")
        .and_then(|v| v.as_str())
        .ok_or((StatusCode::BAD_REQUEST, "filepath is required".to_string()))?;
    let path = PathBuf::from(filepath);
    if !path.is_file() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("file not found: {filepath}"),
        ));
    }

    let max_parts = state.config.transfer.max_ports.min(MAX_PARTS);
    let num_parts = body
        .get("num_parts")
        .and_then(|v| v.as_u64())
        .map(|n| n as usize)
        .unwrap_or(state.config.transfer.num_parts);
    if num_parts == 0 || num_parts > max_parts {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("num_parts must be in 1..={max_parts}"),
        ));
    }
    let base_port = body
        .get("base_port")
        .and_then(|v| v.as_u64())
        .map(|p| p as u16)
        .unwrap_or(state.config.transfer.base_port);
    if usize::from(base_port) + num_parts > 65536 {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("base_port {base_port} leaves no room for {num_parts} data ports"),
        ));
    }
    let compression = body
        .get("compression")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    // Data ports are held exclusively for a session's lifetime, so two live
    // sender sessions may not overlap port ranges.
    let lo = base_port;
    let hi = base_port + (num_parts as u16 - 1);
    let overlap = state.sessions.iter().find_map(|entry| {
        if entry.role != SessionRole::Sender
            || matches!(entry.state, SessionState::Completed | SessionState::Failed)
        {
            return None;
        }
        let ports = &entry.descriptor.ports;
        let (active_lo, active_hi) = (*ports.iter().min()?, *ports.iter().max()?);
        (lo <= active_hi && active_lo <= hi).then(|| entry.key().clone())
    });
    if let Some(existing) = overlap {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("port range {lo}..={hi} overlaps active session {existing}"),
        ));
    }

    // Digest computation reads the whole file — keep it off the handler task.
    let descriptor = {
        let path = path.clone();
        let ip = state.local_ip;
        let algo = state.config.algorithm();
        tokio::task::spawn_blocking(move || {
            TransferDescriptor::for_file(&path, ip, base_port, num_parts, compression, algo)
        })
        .await
        .map_err(internal)?
        .map_err(internal)?
    };

    let session_id = Uuid::new_v4().to_string();
    state.sessions.insert(
        session_id.clone(),
        SessionRecord::sender(descriptor.clone(), path),
    );

    tracing::info!(
        session_id = %session_id,
        filename = %descriptor.filename,
        num_parts,
        "session created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            qr_code_url: format!("/qr/{session_id}"),
            filesize_human: format_size(descriptor.filesize),
            session_id,
            metadata: descriptor,
        }),
    ))
}

// ── /join-session ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct JoinSessionResponse {
    pub session_id: String,
    pub status: SessionState,
    pub sender_ip: IpAddr,
    pub ports: Vec<u16>,
    pub filename: String,
    pub filesize: u64,
}

pub async fn handle_join_session(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> Result<Json<JoinSessionResponse>, (StatusCode, String)> {
    let metadata = body
        .get("metadata")
        .ok_or((StatusCode::BAD_REQUEST, "metadata is required".to_string()))?;
    let descriptor: TransferDescriptor = serde_json::from_value(metadata.clone())
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid metadata: {e}")))?;
    descriptor
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("invalid metadata: {e}")))?;

    let session_id = Uuid::new_v4().to_string();
    let record = SessionRecord::receiver(descriptor);
    let response = JoinSessionResponse {
        session_id: session_id.clone(),
        status: record.state,
        sender_ip: record.descriptor.ip,
        ports: record.descriptor.ports.clone(),
        filename: record.descriptor.filename.clone(),
        filesize: record.descriptor.filesize,
    };
    state.sessions.insert(session_id.clone(), record);

    tracing::info!(session_id = %session_id, "receiver joined session");
    Ok(Json(response))
}

// ── /sessions ─────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub filename: String,
    pub filesize: u64,
    pub status: SessionState,
    pub num_parts: usize,
}

#[derive(Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
    pub count: usize,
}

pub async fn handle_list_sessions(State(state): State<ApiState>) -> Json<SessionsResponse> {
    let sessions: Vec<SessionSummary> = state
        .sessions
        .iter()
        .map(|entry| SessionSummary {
            session_id: entry.key().clone(),
            filename: entry.descriptor.filename.clone(),
            filesize: entry.descriptor.filesize,
            status: entry.state,
            num_parts: entry.descriptor.num_parts,
        })
        .collect();
    let count = sessions.len();
    Json(SessionsResponse { sessions, count })
}

// ── /session/{id} ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct SessionDetailResponse {
    pub session_id: String,
    pub metadata: TransferDescriptor,
    pub role: SessionRole,
    pub status: SessionState,
    pub progress: Vec<u64>,
}

pub async fn handle_get_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionDetailResponse>, (StatusCode, String)> {
    let record = state
        .sessions
        .get(&session_id)
        .ok_or_else(session_not_found)?;

    Ok(Json(SessionDetailResponse {
        session_id,
        metadata: record.descriptor.clone(),
        role: record.role,
        status: record.state,
        progress: record.progress.clone(),
    }))
}

#[derive(Serialize)]
pub struct DeleteSessionResponse {
    pub status: &'static str,
}

pub async fn handle_delete_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, (StatusCode, String)> {
    if state.sessions.remove(&session_id).is_none() {
        return Err(session_not_found());
    }
    tracing::info!(session_id = %session_id, "session deleted");
    Ok(Json(DeleteSessionResponse { status: "deleted" }))
}

//! QR surface — descriptor rendering and the scan helper.

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::Json;
use qrcode::QrCode;
use serde::Serialize;

use super::{internal, session_not_found, ApiState};

// ── /qr/{id} ──────────────────────────────────────────────────────────────────

/// Render the session's descriptor as a QR PNG. The payload is the canonical
/// descriptor JSON, so any scanner can feed `/join-session` directly.
pub async fn handle_qr(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<([(header::HeaderName, &'static str); 1], Vec<u8>), (StatusCode, String)> {
    let payload = state
        .sessions
        .get(&session_id)
        .ok_or_else(session_not_found)?
        .descriptor
        .qr_payload();

    let png = render_png(&payload).map_err(internal)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], png))
}

fn render_png(payload: &str) -> Result<Vec<u8>, String> {
    let code = QrCode::new(payload.as_bytes()).map_err(|e| e.to_string())?;
    let img = code
        .render::<image::Luma<u8>>()
        .min_dimensions(240, 240)
        .build();

    let mut png = Vec::new();
    image::DynamicImage::ImageLuma8(img)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| e.to_string())?;
    Ok(png)
}

// ── /scan-qr ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ScanQrResponse {
    pub success: bool,
}

/// Image QR decoding is not linked into the daemon; the descriptor JSON is
/// always retrievable via /session/{id}, so clients that scanned elsewhere
/// POST the parsed payload straight to /join-session.
pub async fn handle_scan_qr(
    mut multipart: Multipart,
) -> Result<Json<ScanQrResponse>, (StatusCode, String)> {
    let mut saw_image = false;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("image") {
            saw_image = true;
            // Drain the field so the request body is fully consumed.
            let _ = field.bytes().await;
        }
    }

    if !saw_image {
        return Err((
            StatusCode::BAD_REQUEST,
            "no image file provided".to_string(),
        ));
    }
    Err((
        StatusCode::NOT_IMPLEMENTED,
        "QR image decoding is not available; POST the descriptor JSON to /join-session"
            .to_string(),
    ))
}

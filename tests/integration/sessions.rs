//! Session service lifecycle against a live HTTP server.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use serde_json::{json, Value};

use airtrans_api::ApiState;
use airtrans_core::config::Config;
use airtrans_services::new_session_table;

use crate::test_dir;

/// Serve the API on an ephemeral loopback port.
async fn spawn_api() -> SocketAddr {
    let state = ApiState {
        sessions: new_session_table(),
        config: Arc::new(Config::default()),
        local_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
    };
    let app = airtrans_api::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

#[tokio::test]
async fn health_reports_service_identity() {
    let addr = spawn_api().await;
    let body: Value = reqwest::get(url(addr, "/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "AirTrans API");
}

/// S6 — create, join, progress, complete (both outcomes), delete.
#[tokio::test]
async fn full_session_lifecycle() {
    let addr = spawn_api().await;
    let client = reqwest::Client::new();

    let dir = test_dir("lifecycle");
    let src = dir.join("report.bin");
    let data: Vec<u8> = (0..1000u32).map(|i| (i % 255) as u8).collect();
    std::fs::write(&src, &data).unwrap();

    // Sender mints a session.
    let resp = client
        .post(url(addr, "/create-session"))
        .json(&json!({
            "filepath": src.to_str().unwrap(),
            "num_parts": 4,
            "base_port": 46201,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    let session_id = created["session_id"].as_str().unwrap().to_string();
    let metadata = created["metadata"].clone();
    assert_eq!(metadata["filename"], "report.bin");
    assert_eq!(metadata["filesize"], 1000);
    assert_eq!(metadata["num_parts"], 4);
    assert_eq!(
        metadata["ports"],
        json!([46201, 46202, 46203, 46204])
    );
    assert_eq!(created["qr_code_url"], format!("/qr/{session_id}"));
    assert!(created["filesize_human"].as_str().unwrap().contains("B"));

    // Descriptor is retrievable and the QR endpoint serves a PNG of it.
    let detail: Value = client
        .get(url(addr, &format!("/session/{session_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(detail["metadata"], metadata);
    assert_eq!(detail["role"], "sender");
    assert_eq!(detail["status"], "pending");

    let qr = client
        .get(url(addr, &format!("/qr/{session_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(qr.status(), 200);
    assert_eq!(qr.headers()["content-type"], "image/png");
    let png = qr.bytes().await.unwrap();
    assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);

    // Receiver joins with the descriptor.
    let resp = client
        .post(url(addr, "/join-session"))
        .json(&json!({ "metadata": metadata }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let joined: Value = resp.json().await.unwrap();
    let join_id = joined["session_id"].as_str().unwrap().to_string();
    assert_eq!(joined["status"], "ready");
    assert_eq!(joined["filename"], "report.bin");
    assert_eq!(joined["sender_ip"], "127.0.0.1");

    // Simulated transfer: all four parts report their bytes.
    for chunk_id in 0..4 {
        let resp = client
            .post(url(addr, &format!("/update-progress/{join_id}")))
            .json(&json!({ "chunk_id": chunk_id, "bytes_transferred": 250 }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
    let progress: Value = client
        .get(url(addr, &format!("/progress/{join_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(progress["total_transferred"], 1000);
    assert_eq!(progress["percentage"], 100.0);
    assert_eq!(progress["status"], "completed");

    // Completion with the matching digest.
    let resp = client
        .post(url(addr, &format!("/complete/{join_id}")))
        .json(&json!({ "checksum": metadata["checksum"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let complete: Value = resp.json().await.unwrap();
    assert_eq!(complete["checksum_match"], true);
    assert_eq!(complete["status"], "completed");

    // A wrong digest flips the session to failed.
    let resp = client
        .post(url(addr, &format!("/complete/{join_id}")))
        .json(&json!({ "checksum": "00".repeat(32) }))
        .send()
        .await
        .unwrap();
    let complete: Value = resp.json().await.unwrap();
    assert_eq!(complete["checksum_match"], false);
    assert_eq!(complete["status"], "failed");

    // Sessions list shows both, then delete removes one.
    let listing: Value = client
        .get(url(addr, "/sessions"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["count"], 2);

    let resp = client
        .delete(url(addr, &format!("/session/{join_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let resp = client
        .delete(url(addr, &format!("/session/{join_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn create_session_validation() {
    let addr = spawn_api().await;
    let client = reqwest::Client::new();

    // Missing filepath
    let resp = client
        .post(url(addr, "/create-session"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // File does not exist
    let resp = client
        .post(url(addr, "/create-session"))
        .json(&json!({ "filepath": "/definitely/not/here.bin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    // Out-of-range part count
    let dir = test_dir("create-validation");
    let src = dir.join("x.bin");
    std::fs::write(&src, b"x").unwrap();
    let resp = client
        .post(url(addr, "/create-session"))
        .json(&json!({ "filepath": src.to_str().unwrap(), "num_parts": 64 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let _ = std::fs::remove_dir_all(&dir);
}

/// Two live sender sessions may not share data ports.
#[tokio::test]
async fn create_session_rejects_overlapping_port_ranges() {
    let addr = spawn_api().await;
    let client = reqwest::Client::new();

    let dir = test_dir("overlap");
    let src = dir.join("f.bin");
    std::fs::write(&src, b"overlap test payload").unwrap();
    let filepath = src.to_str().unwrap();

    let resp = client
        .post(url(addr, "/create-session"))
        .json(&json!({ "filepath": filepath, "num_parts": 4, "base_port": 46401 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // 46403 falls inside the live 46401..=46404 range.
    let resp = client
        .post(url(addr, "/create-session"))
        .json(&json!({ "filepath": filepath, "num_parts": 2, "base_port": 46403 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // A disjoint range is fine.
    let resp = client
        .post(url(addr, "/create-session"))
        .json(&json!({ "filepath": filepath, "num_parts": 2, "base_port": 46405 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let _ = std::fs::remove_dir_all(&dir);
}

/// Descriptor rejection table for /join-session.
#[tokio::test]
async fn join_session_rejects_invalid_descriptors() {
    let addr = spawn_api().await;
    let client = reqwest::Client::new();

    let valid = json!({
        "filename": "a.bin",
        "filesize": 10,
        "ip": "127.0.0.1",
        "ports": [46301, 46302],
        "num_parts": 2,
        "checksum": "ab".repeat(32),
        "chunk_checksums": ["cd".repeat(32), "ef".repeat(32)],
        "compression": false,
        "version": "1.0",
    });

    // No metadata at all
    let resp = client
        .post(url(addr, "/join-session"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Well-formed descriptor joins fine
    let resp = client
        .post(url(addr, "/join-session"))
        .json(&json!({ "metadata": valid }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // ports shorter than num_parts
    let mut bad = valid.clone();
    bad["ports"] = json!([46301]);
    let resp = client
        .post(url(addr, "/join-session"))
        .json(&json!({ "metadata": bad }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // non-positive filesize
    let mut bad = valid.clone();
    bad["filesize"] = json!(0);
    let resp = client
        .post(url(addr, "/join-session"))
        .json(&json!({ "metadata": bad }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // missing required field
    let mut bad = valid.clone();
    bad.as_object_mut().unwrap().remove("checksum");
    let resp = client
        .post(url(addr, "/join-session"))
        .json(&json!({ "metadata": bad }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

/// Aggregated progress can never exceed filesize, whatever gets reported.
#[tokio::test]
async fn progress_is_clamped_to_filesize() {
    let addr = spawn_api().await;
    let client = reqwest::Client::new();

    let metadata = json!({
        "filename": "clamp.bin",
        "filesize": 10,
        "ip": "127.0.0.1",
        "ports": [46311, 46312, 46313],
        "num_parts": 3,
        "checksum": "ab".repeat(32),
        "chunk_checksums": ["cd".repeat(32), "cd".repeat(32), "cd".repeat(32)],
        "version": "1.0",
    });
    let joined: Value = client
        .post(url(addr, "/join-session"))
        .json(&json!({ "metadata": metadata }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = joined["session_id"].as_str().unwrap();

    // Absurd byte counts per part
    for chunk_id in 0..3 {
        client
            .post(url(addr, &format!("/update-progress/{id}")))
            .json(&json!({ "chunk_id": chunk_id, "bytes_transferred": 1_000_000 }))
            .send()
            .await
            .unwrap();
    }

    let progress: Value = client
        .get(url(addr, &format!("/progress/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(progress["total_transferred"], 10);
    assert_eq!(progress["progress"], json!([3, 3, 4]));

    // Out-of-range chunk_id and missing fields are 400s
    let resp = client
        .post(url(addr, &format!("/update-progress/{id}")))
        .json(&json!({ "chunk_id": 9, "bytes_transferred": 1 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let resp = client
        .post(url(addr, &format!("/update-progress/{id}")))
        .json(&json!({ "chunk_id": 0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown session is a 404
    let resp = client
        .get(url(addr, "/progress/no-such-session"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn scan_qr_without_decoder() {
    let addr = spawn_api().await;
    let client = reqwest::Client::new();

    // No image field: 400
    let form = reqwest::multipart::Form::new().text("note", "hello");
    let resp = client
        .post(url(addr, "/scan-qr"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Image field present but decoding unavailable: 501
    let form = reqwest::multipart::Form::new().part(
        "image",
        reqwest::multipart::Part::bytes(vec![0u8; 16]).file_name("qr.png"),
    );
    let resp = client
        .post(url(addr, "/scan-qr"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 501);
}

//! AirTrans integration tests.
//!
//! Everything runs over loopback sockets: the transfer engine's parallel TCP
//! streams, the axum session service, and the discovery loops are exercised
//! in-process with real network I/O — no external environment required.
//!
//! Each test uses its own scratch directory and its own port range so the
//! suite can run fully parallel.

mod sessions;
mod transfer;

use std::path::PathBuf;

/// Fresh scratch directory for one test.
pub fn test_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("airtrans-it-{tag}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

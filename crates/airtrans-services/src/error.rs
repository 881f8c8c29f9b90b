//! Failure taxonomy for the transfer engine.
//!
//! Every variant is fatal for the transfer it occurs in; the engine does not
//! retry. Callers that want another attempt re-create the session.

use std::net::SocketAddr;

use airtrans_core::descriptor::DescriptorError;
use airtrans_core::framing::FrameError;

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("descriptor invalid: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        source: std::io::Error,
    },

    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("connection to {addr} timed out after {secs}s")]
    ConnectTimeout { addr: SocketAddr, secs: u64 },

    #[error("part {chunk_id}: framing error: {source}")]
    Framing {
        chunk_id: usize,
        source: FrameError,
    },

    #[error("part {chunk_id}: preamble announces {announced} bytes, partition expects {expected}")]
    SizeMismatch {
        chunk_id: usize,
        announced: u64,
        expected: u64,
    },

    #[error("preamble names part {chunk_id}, but the transfer has {num_parts} parts")]
    ChunkOutOfRange { chunk_id: usize, num_parts: usize },

    #[error("part {chunk_id} delivered by more than one stream")]
    DuplicateChunk { chunk_id: usize },

    #[error("part {chunk_id}: stream ended after {got} of {expected} payload bytes")]
    ShortRead {
        chunk_id: usize,
        got: u64,
        expected: u64,
    },

    #[error("part {chunk_id} digest mismatch")]
    ChunkChecksum { chunk_id: usize },

    #[error("whole-file digest mismatch: expected {expected}, got {actual}")]
    FileChecksum { expected: String, actual: String },

    #[error("transfer timed out after {secs}s; incomplete parts: {parts:?}")]
    Timeout { secs: u64, parts: Vec<usize> },

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TransferError {
    /// True for per-part or whole-file digest failures — the cases where an
    /// output file must never be surfaced as successful.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::ChunkChecksum { .. } | Self::FileChecksum { .. } | Self::DuplicateChunk { .. }
        )
    }
}

//! Session registry — control-plane records, one per transfer.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use airtrans_core::descriptor::TransferDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Created by the sender, no transfer activity yet.
    Pending,
    /// Receiver joined and validated the descriptor.
    Ready,
    Transferring,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    Sender,
    Receiver,
}

/// One transfer session as the control plane sees it. The descriptor is
/// immutable; state and progress evolve.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub descriptor: TransferDescriptor,
    pub role: SessionRole,
    pub state: SessionState,
    /// Sender-side source path. Receivers carry none.
    pub filepath: Option<PathBuf>,
    /// Per-part transferred bytes, indexed by chunk id. Last-writer-wins.
    pub progress: Vec<u64>,
}

impl SessionRecord {
    pub fn sender(descriptor: TransferDescriptor, filepath: PathBuf) -> Self {
        let num_parts = descriptor.num_parts;
        Self {
            descriptor,
            role: SessionRole::Sender,
            state: SessionState::Pending,
            filepath: Some(filepath),
            progress: vec![0; num_parts],
        }
    }

    pub fn receiver(descriptor: TransferDescriptor) -> Self {
        let num_parts = descriptor.num_parts;
        Self {
            descriptor,
            role: SessionRole::Receiver,
            state: SessionState::Ready,
            filepath: None,
            progress: vec![0; num_parts],
        }
    }

    pub fn total_transferred(&self) -> u64 {
        self.progress.iter().sum()
    }

    pub fn percentage(&self) -> f64 {
        (self.total_transferred() as f64 / self.descriptor.filesize as f64) * 100.0
    }

    /// Record a part's cumulative byte count, clamped to that part's length
    /// so the aggregate can never exceed `filesize`. Moves the session into
    /// `transferring`, or `completed` once every byte is accounted for.
    pub fn record_progress(&mut self, chunk_id: usize, bytes: u64) {
        let spans = self.descriptor.spans();
        if let (Some(slot), Some(span)) = (self.progress.get_mut(chunk_id), spans.get(chunk_id)) {
            *slot = bytes.min(span.len);
        }
        self.state = if self.total_transferred() >= self.descriptor.filesize {
            SessionState::Completed
        } else {
            SessionState::Transferring
        };
    }

    /// Resolve the terminal state from the completion check.
    pub fn finish(&mut self, checksum_match: bool) {
        self.state = if checksum_match {
            SessionState::Completed
        } else {
            SessionState::Failed
        };
    }
}

/// The session table — shared across HTTP handler tasks. DashMap serializes
/// mutation per key, which is exactly the per-session_id contract.
pub type SessionTable = Arc<DashMap<String, SessionRecord>>;

pub fn new_session_table() -> SessionTable {
    Arc::new(DashMap::new())
}

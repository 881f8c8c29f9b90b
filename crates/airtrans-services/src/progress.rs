//! Per-part progress counters shared between the engine and observers.
//!
//! Each counter is written only by the task that owns that part; readers
//! aggregate and tolerate slightly stale values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone)]
pub struct ProgressCounters {
    parts: Arc<[AtomicU64]>,
}

impl ProgressCounters {
    pub fn new(num_parts: usize) -> Self {
        let parts: Vec<AtomicU64> = (0..num_parts).map(|_| AtomicU64::new(0)).collect();
        Self {
            parts: parts.into(),
        }
    }

    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    /// Record the cumulative byte count for one part. Owner task only.
    pub fn set(&self, chunk_id: usize, bytes: u64) {
        if let Some(counter) = self.parts.get(chunk_id) {
            counter.store(bytes, Ordering::Relaxed);
        }
    }

    pub fn part(&self, chunk_id: usize) -> u64 {
        self.parts
            .get(chunk_id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum across all parts. May lag the owners by a write or two.
    pub fn total(&self) -> u64 {
        self.parts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn snapshot(&self) -> Vec<u64> {
        self.parts
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .collect()
    }
}

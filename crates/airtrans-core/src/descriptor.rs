//! Transfer descriptor — the out-of-band object describing one transfer.
//!
//! The descriptor travels from sender to receiver outside the data path
//! (QR payload, copied JSON, or the session service). Given `filesize` and
//! `num_parts`, every part offset and length is derivable on both sides, so
//! the wire never carries them.

use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::integrity::{self, HashAlgorithm};

/// Protocol version tag carried in every descriptor.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Upper bound on parts per transfer — one TCP stream per part.
pub const MAX_PARTS: usize = 32;

/// One of the N disjoint byte ranges covering the source file.
///
/// Interior parts have length `filesize / num_parts`; the last part absorbs
/// the remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartSpan {
    pub index: usize,
    pub offset: u64,
    pub len: u64,
}

/// Compute the deterministic partition of `filesize` bytes into `num_parts`
/// contiguous spans. Panics if `num_parts` is zero — callers validate range
/// before partitioning.
pub fn part_spans(filesize: u64, num_parts: usize) -> Vec<PartSpan> {
    assert!(num_parts > 0, "num_parts must be at least 1");
    let base = filesize / num_parts as u64;
    (0..num_parts)
        .map(|index| {
            let offset = index as u64 * base;
            let len = if index == num_parts - 1 {
                filesize - offset
            } else {
                base
            };
            PartSpan { index, offset, len }
        })
        .collect()
}

/// The immutable transfer descriptor. Serialized as JSON for the session
/// service and the QR payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferDescriptor {
    /// Leaf name of the source file. The receiver writes to this name under
    /// its download directory.
    pub filename: String,
    /// Exact byte length of the source. Strictly positive.
    pub filesize: u64,
    /// Sender's reachable address.
    pub ip: IpAddr,
    /// Listening TCP ports, one per part, in part order.
    pub ports: Vec<u16>,
    /// Number of parts. Equals `ports.len()`.
    pub num_parts: usize,
    /// Hex digest of the whole source under the agreed hash.
    pub checksum: String,
    /// Hex digests of each part, in part order.
    pub chunk_checksums: Vec<String>,
    /// Whether the payload bytes are a compressed stream. Opaque to the
    /// transfer engine.
    #[serde(default)]
    pub compression: bool,
    /// Protocol version tag.
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("filename is empty or contains path separators")]
    BadFilename,
    #[error("filesize must be strictly positive")]
    EmptyFile,
    #[error("num_parts {0} out of range 1..={MAX_PARTS}")]
    PartCountOutOfRange(usize),
    #[error("ports length {ports} does not match num_parts {num_parts}")]
    PortCountMismatch { ports: usize, num_parts: usize },
    #[error("chunk_checksums length {checksums} does not match num_parts {num_parts}")]
    ChecksumCountMismatch { checksums: usize, num_parts: usize },
    #[error("whole-file checksum is empty")]
    MissingChecksum,
}

impl TransferDescriptor {
    /// Build a descriptor for a file on disk, computing the whole-file and
    /// per-part digests. Blocking — call from `spawn_blocking` in async
    /// contexts. `num_parts` must already be in range.
    pub fn for_file(
        path: &Path,
        ip: IpAddr,
        base_port: u16,
        num_parts: usize,
        compression: bool,
        algo: HashAlgorithm,
    ) -> std::io::Result<Self> {
        let filesize = std::fs::metadata(path)?.len();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();

        let checksum = integrity::file_digest(path, algo)?;
        let chunk_checksums = integrity::part_digests(path, num_parts, algo)?;
        let ports = (0..num_parts as u16).map(|i| base_port + i).collect();

        Ok(Self {
            filename,
            filesize,
            ip,
            ports,
            num_parts,
            checksum,
            chunk_checksums,
            compression,
            version: PROTOCOL_VERSION.to_string(),
        })
    }

    /// Check the structural invariants. Consumers reject any descriptor
    /// failing these before opening a single connection.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.filename.is_empty() || self.filename.contains(['/', '\\']) {
            return Err(DescriptorError::BadFilename);
        }
        if self.filesize == 0 {
            return Err(DescriptorError::EmptyFile);
        }
        if self.num_parts == 0 || self.num_parts > MAX_PARTS {
            return Err(DescriptorError::PartCountOutOfRange(self.num_parts));
        }
        if self.ports.len() != self.num_parts {
            return Err(DescriptorError::PortCountMismatch {
                ports: self.ports.len(),
                num_parts: self.num_parts,
            });
        }
        if self.chunk_checksums.len() != self.num_parts {
            return Err(DescriptorError::ChecksumCountMismatch {
                checksums: self.chunk_checksums.len(),
                num_parts: self.num_parts,
            });
        }
        if self.checksum.is_empty() {
            return Err(DescriptorError::MissingChecksum);
        }
        Ok(())
    }

    /// The partition this descriptor implies.
    pub fn spans(&self) -> Vec<PartSpan> {
        part_spans(self.filesize, self.num_parts)
    }

    /// Canonical JSON string encoded into the QR image.
    pub fn qr_payload(&self) -> String {
        serde_json::to_string(self).expect("descriptor serializes")
    }
}

/// Human-readable byte count, e.g. "1.50 MB".
pub fn format_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} PB")
}

//! File- and part-level integrity digests.
//!
//! Whole files are digested with a fixed-size read buffer so sources larger
//! than RAM never need a single contiguous read. Per-part digests follow the
//! exact partitioning in [`crate::descriptor::part_spans`], so both sides of
//! a transfer derive identical digest sequences from the same bytes.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256, Sha512};

use crate::descriptor::part_spans;

/// Read buffer for streaming digests.
const DIGEST_BUF_SIZE: usize = 8 * 1024;

/// The agreed hash. Both sides of a transfer must use the same algorithm;
/// the tag travels in configuration, not on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Parse a config tag like "sha256". Unknown tags are rejected.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.to_ascii_lowercase().as_str() {
            "sha256" => Some(Self::Sha256),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

/// Incremental digest over one algorithm. Used by the receiver to hash part
/// bytes as they stream in, without buffering the part.
pub struct Hasher(Inner);

enum Inner {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    pub fn new(algo: HashAlgorithm) -> Self {
        match algo {
            HashAlgorithm::Sha256 => Self(Inner::Sha256(Sha256::new())),
            HashAlgorithm::Sha512 => Self(Inner::Sha512(Sha512::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.0 {
            Inner::Sha256(h) => h.update(data),
            Inner::Sha512(h) => h.update(data),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self.0 {
            Inner::Sha256(h) => hex::encode(h.finalize()),
            Inner::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Hex digest of a byte slice.
pub fn digest_bytes(algo: HashAlgorithm, data: &[u8]) -> String {
    let mut hasher = Hasher::new(algo);
    hasher.update(data);
    hasher.finalize_hex()
}

/// Streaming hex digest of a whole file.
pub fn file_digest(path: &Path, algo: HashAlgorithm) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Hasher::new(algo);
    let mut buf = [0u8; DIGEST_BUF_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

/// Hex digest of each part of a file, in part order, reading exactly the
/// spans the partitioning defines.
pub fn part_digests(path: &Path, num_parts: usize, algo: HashAlgorithm) -> io::Result<Vec<String>> {
    let mut file = File::open(path)?;
    let filesize = file.metadata()?.len();
    let mut buf = [0u8; DIGEST_BUF_SIZE];
    let mut digests = Vec::with_capacity(num_parts);

    for span in part_spans(filesize, num_parts) {
        file.seek(SeekFrom::Start(span.offset))?;
        let mut hasher = Hasher::new(algo);
        let mut remaining = span.len;
        while remaining > 0 {
            let want = remaining.min(DIGEST_BUF_SIZE as u64) as usize;
            let n = file.read(&mut buf[..want])?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "file shrank while computing part digests",
                ));
            }
            hasher.update(&buf[..n]);
            remaining -= n as u64;
        }
        digests.push(hasher.finalize_hex());
    }
    Ok(digests)
}

/// Compare two hex digests, case-insensitively.
pub fn verify(actual: &str, expected: &str) -> bool {
    actual.eq_ignore_ascii_case(expected)
}

//! Per-stream framing — the length-prefixed preamble ahead of each part.
//!
//! Wire layout on every part stream:
//!
//! ```text
//! [4-byte BE length L][L bytes MessagePack preamble][`size` payload bytes]
//! ```
//!
//! then FIN from the sender. No trailing delimiter. The preamble is encoded
//! as a named MessagePack map so the receiver can describe and verify the
//! payload before reading a byte of it.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Hard cap on the encoded preamble. A longer length prefix is a framing
/// error, not an allocation request.
pub const MAX_PREAMBLE_BYTES: u32 = 64 * 1024;

/// The metadata map preceding each part's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preamble {
    /// Part index this stream carries. Placement key at the receiver.
    pub chunk_id: u32,
    /// Byte length of the payload that follows.
    pub size: u64,
    /// Hex digest of the payload under the agreed hash.
    pub checksum: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("preamble of {0} bytes exceeds the {MAX_PREAMBLE_BYTES} byte cap")]
    PreambleTooLarge(u32),
    #[error("preamble decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("preamble encode failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
}

impl FrameError {
    /// A read that hit EOF before the requested byte count.
    pub fn is_short_read(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

impl Preamble {
    /// Encode as a named MessagePack map.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Write the length prefix and encoded preamble. Payload bytes follow from
/// the caller.
pub async fn write_preamble<W>(writer: &mut W, preamble: &Preamble) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let body = preamble.encode()?;
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    Ok(())
}

/// Read exactly one preamble: 4-byte BE length, then that many body bytes.
/// EOF mid-read surfaces as an `UnexpectedEof` i/o error.
pub async fn read_preamble<R>(reader: &mut R) -> Result<Preamble, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_PREAMBLE_BYTES {
        return Err(FrameError::PreambleTooLarge(len));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    Preamble::decode(&body)
}

//! Transfer engine — receiver side.
//!
//! Opens one TCP connection per part, places bytes by the preamble's
//! `chunk_id` into a hidden partial file, and renames into place only after
//! the whole-file digest verifies. Any failure cancels the remaining streams
//! and removes the partial file.

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio::time::timeout;

use airtrans_core::descriptor::{PartSpan, TransferDescriptor};
use airtrans_core::framing;
use airtrans_core::integrity::{self, HashAlgorithm, Hasher};

use crate::error::TransferError;
use crate::progress::ProgressCounters;
use crate::sender::mbps;

#[derive(Debug, Clone)]
pub struct ReceiveOptions {
    /// Connect and per-read stall timeout.
    pub io_timeout: Duration,
    pub block_size: usize,
    pub algorithm: HashAlgorithm,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_secs(10),
            block_size: 1024 * 1024,
            algorithm: HashAlgorithm::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReceiveReport {
    pub path: PathBuf,
    pub bytes: u64,
    pub elapsed: Duration,
    pub avg_mbps: f64,
}

/// Fetch every part named by `descriptor` into `output_dir/filename`.
///
/// The partial file keeps a hidden name until the whole-file digest checks
/// out; a failed transfer leaves nothing behind at the final name.
pub async fn receive_file(
    descriptor: &TransferDescriptor,
    output_dir: &Path,
    opts: &ReceiveOptions,
    progress: &ProgressCounters,
) -> Result<ReceiveReport, TransferError> {
    descriptor.validate()?;
    tokio::fs::create_dir_all(output_dir).await?;

    let part_path = output_dir.join(format!(".{}.airtrans-part", descriptor.filename));
    let final_path = output_dir.join(&descriptor.filename);
    {
        let file = tokio::fs::File::create(&part_path).await?;
        file.set_len(descriptor.filesize).await?;
    }

    tracing::info!(
        filename = %descriptor.filename,
        filesize = descriptor.filesize,
        num_parts = descriptor.num_parts,
        sender = %descriptor.ip,
        "receiver starting"
    );

    let started = Instant::now();
    let spans = Arc::new(descriptor.spans());
    let expected_digests = Arc::new(descriptor.chunk_checksums.clone());
    let claimed: Arc<Vec<AtomicBool>> = Arc::new(
        (0..descriptor.num_parts)
            .map(|_| AtomicBool::new(false))
            .collect(),
    );

    let mut tasks = JoinSet::new();
    for (index, port) in descriptor.ports.iter().enumerate() {
        let addr = SocketAddr::new(descriptor.ip, *port);
        tasks.spawn(fetch_part(
            addr,
            index,
            spans.clone(),
            expected_digests.clone(),
            part_path.clone(),
            claimed.clone(),
            opts.clone(),
            progress.clone(),
        ));
    }

    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            // First failure wins; everything else is cancelled.
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
            let _ = tokio::fs::remove_file(&part_path).await;
            tracing::warn!(error = %e, "transfer aborted");
            return Err(e);
        }
    }

    // Whole-file verification before the partial file may take the real name.
    let actual = {
        let path = part_path.clone();
        let algo = opts.algorithm;
        tokio::task::spawn_blocking(move || integrity::file_digest(&path, algo)).await??
    };
    if !integrity::verify(&actual, &descriptor.checksum) {
        let _ = tokio::fs::remove_file(&part_path).await;
        return Err(TransferError::FileChecksum {
            expected: descriptor.checksum.clone(),
            actual,
        });
    }
    tokio::fs::rename(&part_path, &final_path).await?;

    let elapsed = started.elapsed();
    let avg_mbps = mbps(descriptor.filesize, elapsed);
    tracing::info!(
        path = %final_path.display(),
        elapsed_secs = elapsed.as_secs_f64(),
        avg_mbps,
        "file received and verified"
    );

    Ok(ReceiveReport {
        path: final_path,
        bytes: descriptor.filesize,
        elapsed,
        avg_mbps,
    })
}

/// Read one part stream: preamble, then exactly `size` payload bytes written
/// at the offset the chunk id implies. The payload is hashed as it streams.
#[allow(clippy::too_many_arguments)]
async fn fetch_part(
    addr: SocketAddr,
    stream_index: usize,
    spans: Arc<Vec<PartSpan>>,
    expected_digests: Arc<Vec<String>>,
    part_path: PathBuf,
    claimed: Arc<Vec<AtomicBool>>,
    opts: ReceiveOptions,
    progress: ProgressCounters,
) -> Result<(), TransferError> {
    let secs = opts.io_timeout.as_secs();
    let mut stream = match timeout(opts.io_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => return Err(TransferError::Connect { addr, source }),
        Err(_) => return Err(TransferError::ConnectTimeout { addr, secs }),
    };
    tracing::debug!(stream_index, %addr, "connected");

    let preamble = timeout(opts.io_timeout, framing::read_preamble(&mut stream))
        .await
        .map_err(|_| stall(stream_index, secs))?
        .map_err(|source| TransferError::Framing {
            chunk_id: stream_index,
            source,
        })?;

    let chunk_id = preamble.chunk_id as usize;
    let span = match spans.get(chunk_id) {
        Some(span) => *span,
        None => {
            return Err(TransferError::ChunkOutOfRange {
                chunk_id,
                num_parts: spans.len(),
            })
        }
    };
    if preamble.size != span.len {
        return Err(TransferError::SizeMismatch {
            chunk_id,
            announced: preamble.size,
            expected: span.len,
        });
    }
    // Placement is keyed on chunk_id, so a second stream naming the same part
    // is an integrity failure, whatever port it arrived on.
    if claimed[chunk_id].swap(true, Ordering::SeqCst) {
        return Err(TransferError::DuplicateChunk { chunk_id });
    }
    if chunk_id != stream_index {
        tracing::warn!(stream_index, chunk_id, "part arrived on an unexpected port");
    }

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .open(&part_path)
        .await?;
    file.seek(SeekFrom::Start(span.offset)).await?;

    let mut hasher = Hasher::new(opts.algorithm);
    let mut buf = vec![0u8; opts.block_size];
    let mut received = 0u64;
    while received < span.len {
        let want = (span.len - received).min(opts.block_size as u64) as usize;
        let n = timeout(opts.io_timeout, stream.read(&mut buf[..want]))
            .await
            .map_err(|_| stall(chunk_id, secs))??;
        if n == 0 {
            return Err(TransferError::ShortRead {
                chunk_id,
                got: received,
                expected: span.len,
            });
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n]).await?;
        received += n as u64;
        progress.set(chunk_id, received);
    }
    file.flush().await?;

    let digest = hasher.finalize_hex();
    if !integrity::verify(&digest, &preamble.checksum)
        || !integrity::verify(&digest, &expected_digests[chunk_id])
    {
        return Err(TransferError::ChunkChecksum { chunk_id });
    }

    tracing::debug!(chunk_id, bytes = received, "part received");
    Ok(())
}

fn stall(chunk_id: usize, secs: u64) -> TransferError {
    TransferError::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("part {chunk_id} stream stalled for {secs}s"),
    ))
}

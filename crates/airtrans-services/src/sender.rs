//! Transfer engine — sender side.
//!
//! Binds one TCP listener per part and serves each part's bytes to the first
//! connection that arrives. Every part task streams from its own handle on
//! the source file by computed offset, so the file is never held in memory.

use std::io::SeekFrom;
use std::path::Path;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use airtrans_core::descriptor::{part_spans, DescriptorError, PartSpan, MAX_PARTS};
use airtrans_core::framing::{self, Preamble};
use airtrans_core::integrity::{self, HashAlgorithm};

use crate::error::TransferError;
use crate::progress::ProgressCounters;

#[derive(Debug, Clone)]
pub struct SendOptions {
    pub num_parts: usize,
    pub base_port: u16,
    /// Stream block size.
    pub block_size: usize,
    /// Wall-clock ceiling for the whole orchestration.
    pub overall_timeout: Duration,
    pub algorithm: HashAlgorithm,
}

impl SendOptions {
    pub fn new(num_parts: usize, base_port: u16) -> Self {
        Self {
            num_parts,
            base_port,
            block_size: 1024 * 1024,
            overall_timeout: Duration::from_secs(300),
            algorithm: HashAlgorithm::default(),
        }
    }
}

/// What `send_file` hands back after every part has been delivered.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub filename: String,
    pub filesize: u64,
    pub ports: Vec<u16>,
    pub num_parts: usize,
    pub checksum: String,
    pub elapsed: Duration,
    pub avg_mbps: f64,
}

/// Serve `path` over `num_parts` parallel TCP streams on ports
/// `base_port..base_port+num_parts`. Completes when every part has been
/// delivered, or fails with [`TransferError::Timeout`] naming the parts
/// still outstanding when the ceiling elapsed.
pub async fn send_file(
    path: &Path,
    opts: &SendOptions,
    progress: &ProgressCounters,
) -> Result<SendReport, TransferError> {
    if opts.num_parts == 0 || opts.num_parts > MAX_PARTS {
        return Err(DescriptorError::PartCountOutOfRange(opts.num_parts).into());
    }
    let filesize = tokio::fs::metadata(path).await?.len();
    if filesize == 0 {
        return Err(DescriptorError::EmptyFile.into());
    }
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();

    let (checksum, chunk_checksums) = {
        let path = path.to_path_buf();
        let (num_parts, algo) = (opts.num_parts, opts.algorithm);
        tokio::task::spawn_blocking(move || -> std::io::Result<(String, Vec<String>)> {
            let whole = integrity::file_digest(&path, algo)?;
            let parts = integrity::part_digests(&path, num_parts, algo)?;
            Ok((whole, parts))
        })
        .await??
    };

    // Bind everything up front so a taken port fails the whole call before
    // any receiver can connect.
    let spans = part_spans(filesize, opts.num_parts);
    let mut listeners = Vec::with_capacity(opts.num_parts);
    let mut ports = Vec::with_capacity(opts.num_parts);
    for span in &spans {
        let port = opts.base_port + span.index as u16;
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| TransferError::Bind { port, source })?;
        listeners.push(listener);
        ports.push(port);
    }

    tracing::info!(
        filename = %filename,
        filesize,
        num_parts = opts.num_parts,
        base_port = opts.base_port,
        "sender listening"
    );

    let started = Instant::now();
    let mut tasks = JoinSet::new();
    for (listener, span) in listeners.into_iter().zip(spans) {
        let path = path.to_path_buf();
        let digest = chunk_checksums[span.index].clone();
        let progress = progress.clone();
        let block_size = opts.block_size;
        tasks.spawn(serve_part(listener, path, span, digest, block_size, progress));
    }

    let deadline = tokio::time::sleep(opts.overall_timeout);
    tokio::pin!(deadline);
    let mut done = vec![false; opts.num_parts];

    while done.iter().any(|d| !d) {
        tokio::select! {
            _ = &mut deadline => {
                tasks.abort_all();
                let parts: Vec<usize> = done
                    .iter()
                    .enumerate()
                    .filter(|(_, delivered)| !**delivered)
                    .map(|(i, _)| i)
                    .collect();
                tracing::warn!(?parts, "transfer timed out");
                return Err(TransferError::Timeout {
                    secs: opts.overall_timeout.as_secs(),
                    parts,
                });
            }
            joined = tasks.join_next() => match joined {
                Some(Ok(Ok(chunk_id))) => done[chunk_id] = true,
                Some(Ok(Err(e))) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Some(Err(e)) => {
                    tasks.abort_all();
                    return Err(e.into());
                }
                None => break,
            }
        }
    }

    let elapsed = started.elapsed();
    let avg_mbps = mbps(filesize, elapsed);
    tracing::info!(
        filename = %filename,
        elapsed_secs = elapsed.as_secs_f64(),
        avg_mbps,
        "all parts delivered"
    );

    Ok(SendReport {
        filename,
        filesize,
        ports,
        num_parts: opts.num_parts,
        checksum,
        elapsed,
        avg_mbps,
    })
}

/// Serve exactly one part to the first connection on its listener: preamble,
/// then the payload in blocks, then FIN.
async fn serve_part(
    listener: TcpListener,
    path: std::path::PathBuf,
    span: PartSpan,
    digest: String,
    block_size: usize,
    progress: ProgressCounters,
) -> Result<usize, TransferError> {
    let (mut stream, peer) = listener.accept().await?;
    tracing::debug!(part = span.index, peer = %peer, "receiver connected");

    let preamble = Preamble {
        chunk_id: span.index as u32,
        size: span.len,
        checksum: digest,
    };
    framing::write_preamble(&mut stream, &preamble)
        .await
        .map_err(|source| TransferError::Framing {
            chunk_id: span.index,
            source,
        })?;

    let mut file = tokio::fs::File::open(&path).await?;
    file.seek(SeekFrom::Start(span.offset)).await?;

    let mut buf = vec![0u8; block_size];
    let mut sent = 0u64;
    while sent < span.len {
        let want = (span.len - sent).min(block_size as u64) as usize;
        let n = file.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "source file shrank mid-transfer",
            )
            .into());
        }
        stream.write_all(&buf[..n]).await?;
        sent += n as u64;
        progress.set(span.index, sent);
    }

    stream.flush().await?;
    stream.shutdown().await?;
    tracing::debug!(part = span.index, bytes = sent, "part sent");
    Ok(span.index)
}

pub(crate) fn mbps(bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    (bytes as f64 / secs) / (1024.0 * 1024.0)
}

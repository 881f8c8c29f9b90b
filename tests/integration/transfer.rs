//! End-to-end transfer engine scenarios over loopback TCP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use airtrans_core::descriptor::TransferDescriptor;
use airtrans_core::framing::{self, Preamble};
use airtrans_core::integrity::{self, HashAlgorithm};
use airtrans_services::{
    receive_file, send_file, ProgressCounters, ReceiveOptions, SendOptions, TransferError,
};

use crate::test_dir;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn descriptor_for(path: &Path, base_port: u16, num_parts: usize) -> TransferDescriptor {
    TransferDescriptor::for_file(
        path,
        LOCALHOST,
        base_port,
        num_parts,
        false,
        HashAlgorithm::Sha256,
    )
    .unwrap()
}

/// Spawn the sender engine and give its listeners a moment to bind.
async fn spawn_sender(
    path: &Path,
    num_parts: usize,
    base_port: u16,
) -> tokio::task::JoinHandle<Result<airtrans_services::SendReport, TransferError>> {
    let path = path.to_path_buf();
    let handle = tokio::spawn(async move {
        let opts = SendOptions::new(num_parts, base_port);
        let progress = ProgressCounters::new(num_parts);
        send_file(&path, &opts, &progress).await
    });
    tokio::time::sleep(Duration::from_millis(5000)).await;
    handle
}

/// S1 — a one-byte file over a single part.
#[tokio::test]
async fn single_byte_single_part() {
    let dir = test_dir("s1");
    let src = dir.join("one.bin");
    std::fs::write(&src, [0x41]).unwrap();

    let base_port = 46101;
    let descriptor = descriptor_for(&src, base_port, 1);
    let sender = spawn_sender(&src, 1, base_port).await;

    let out_dir = dir.join("out");
    let progress = ProgressCounters::new(1);
    let report = receive_file(&descriptor, &out_dir, &ReceiveOptions::default(), &progress)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&report.path).unwrap(), [0x41]);
    assert_eq!(report.bytes, 1);

    let send_report = sender.await.unwrap().unwrap();
    assert_eq!(send_report.filesize, 1);
    assert_eq!(send_report.checksum, descriptor.checksum);

    let _ = std::fs::remove_dir_all(&dir);
}

/// S2 — 10 bytes over 3 parts (lengths 3, 3, 4).
#[tokio::test]
async fn uneven_split_reassembles_in_order() {
    let dir = test_dir("s2");
    let src = dir.join("digits.bin");
    let data: Vec<u8> = (0..=9).collect();
    std::fs::write(&src, &data).unwrap();

    let base_port = 46111;
    let descriptor = descriptor_for(&src, base_port, 3);
    let sender = spawn_sender(&src, 3, base_port).await;

    let out_dir = dir.join("out");
    let progress = ProgressCounters::new(3);
    let report = receive_file(&descriptor, &out_dir, &ReceiveOptions::default(), &progress)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&report.path).unwrap(), data);
    // Per-part counters settle on the partition lengths 3, 3, 4.
    assert_eq!(progress.snapshot(), vec![3, 3, 4]);

    sender.await.unwrap().unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}

/// S3 — 32 MiB fanned out over 8 concurrent streams.
#[tokio::test]
async fn parallel_fan_out_32_mib() {
    let dir = test_dir("s3");
    let src = dir.join("bulk.bin");
    let data = vec![0xAB; 32 * 1024 * 1024];
    std::fs::write(&src, &data).unwrap();

    let base_port = 46121;
    let descriptor = descriptor_for(&src, base_port, 8);
    let sender = spawn_sender(&src, 8, base_port).await;

    let out_dir = dir.join("out");
    let progress = ProgressCounters::new(8);
    let report = receive_file(&descriptor, &out_dir, &ReceiveOptions::default(), &progress)
        .await
        .unwrap();

    assert_eq!(report.bytes, data.len() as u64);
    assert_eq!(progress.total(), data.len() as u64);
    let received = std::fs::read(&report.path).unwrap();
    assert_eq!(received, data);
    assert_eq!(
        integrity::file_digest(&report.path, HashAlgorithm::Sha256).unwrap(),
        descriptor.checksum
    );

    sender.await.unwrap().unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}

/// Pass bytes through unchanged except the very last one, which is flipped.
/// The last byte of a part stream is payload, so the part digest breaks.
async fn flip_last_byte_forwarder(listener: TcpListener, target: SocketAddr) {
    let (mut inbound, _) = listener.accept().await.unwrap();
    let mut upstream = TcpStream::connect(target).await.unwrap();

    let mut bytes = Vec::new();
    upstream.read_to_end(&mut bytes).await.unwrap();
    if let Some(last) = bytes.last_mut() {
        *last ^= 0x01;
    }
    inbound.write_all(&bytes).await.unwrap();
    inbound.shutdown().await.unwrap();
}

/// S4 — a bit flipped on part 4's stream fails the transfer and leaves no
/// output file.
#[tokio::test]
async fn tampered_part_is_rejected() {
    let dir = test_dir("s4");
    let src = dir.join("victim.bin");
    let data = vec![0xAB; 8 * 1024 * 1024];
    std::fs::write(&src, &data).unwrap();

    let base_port = 46131;
    let mut descriptor = descriptor_for(&src, base_port, 8);
    let sender = spawn_sender(&src, 8, base_port).await;

    // Route part 4 through an on-path fault.
    let proxy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_port = proxy.local_addr().unwrap().port();
    let target = SocketAddr::new(LOCALHOST, base_port + 4);
    tokio::spawn(flip_last_byte_forwarder(proxy, target));
    descriptor.ports[4] = proxy_port;

    let out_dir = dir.join("out");
    let err = receive_file(
        &descriptor,
        &out_dir,
        &ReceiveOptions::default(),
        &ProgressCounters::new(8),
    )
    .await
    .unwrap_err();

    assert!(
        matches!(err, TransferError::ChunkChecksum { chunk_id: 4 }),
        "got {err:?}"
    );
    assert!(err.is_integrity());
    assert!(!out_dir.join("victim.bin").exists());
    assert!(!out_dir.join(".victim.bin.airtrans-part").exists());

    sender.abort();
    let _ = std::fs::remove_dir_all(&dir);
}

/// Serve one framed part stream, as a misbehaving sender would.
async fn serve_fixed_part(listener: TcpListener, chunk_id: u32, payload: Vec<u8>) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let preamble = Preamble {
        chunk_id,
        size: payload.len() as u64,
        checksum: integrity::digest_bytes(HashAlgorithm::Sha256, &payload),
    };
    framing::write_preamble(&mut stream, &preamble).await.unwrap();
    stream.write_all(&payload).await.unwrap();
    stream.shutdown().await.unwrap();
}

/// Two streams both claiming chunk 0: the second claim is an integrity
/// failure.
#[tokio::test]
async fn duplicate_chunk_id_fails_transfer() {
    let dir = test_dir("dup");
    let data: Vec<u8> = (0..10).collect();
    let part0 = data[0..5].to_vec();

    let a = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let b = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ports = vec![
        a.local_addr().unwrap().port(),
        b.local_addr().unwrap().port(),
    ];
    tokio::spawn(serve_fixed_part(a, 0, part0.clone()));
    tokio::spawn(serve_fixed_part(b, 0, part0.clone()));

    let descriptor = TransferDescriptor {
        filename: "dup.bin".into(),
        filesize: 10,
        ip: LOCALHOST,
        ports,
        num_parts: 2,
        checksum: integrity::digest_bytes(HashAlgorithm::Sha256, &data),
        chunk_checksums: vec![
            integrity::digest_bytes(HashAlgorithm::Sha256, &data[0..5]),
            integrity::digest_bytes(HashAlgorithm::Sha256, &data[5..10]),
        ],
        compression: false,
        version: "1.0".into(),
    };

    let err = receive_file(
        &descriptor,
        &dir.join("out"),
        &ReceiveOptions::default(),
        &ProgressCounters::new(2),
    )
    .await
    .unwrap_err();

    assert!(
        matches!(err, TransferError::DuplicateChunk { chunk_id: 0 }),
        "got {err:?}"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

/// A preamble whose size disagrees with the partition is fatal.
#[tokio::test]
async fn preamble_size_mismatch_is_rejected() {
    let dir = test_dir("sizemismatch");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    // Announces 3 bytes where the partition expects 4.
    tokio::spawn(serve_fixed_part(listener, 0, vec![1, 2, 3]));

    let descriptor = TransferDescriptor {
        filename: "short.bin".into(),
        filesize: 4,
        ip: LOCALHOST,
        ports: vec![port],
        num_parts: 1,
        checksum: integrity::digest_bytes(HashAlgorithm::Sha256, &[1, 2, 3, 4]),
        chunk_checksums: vec![integrity::digest_bytes(HashAlgorithm::Sha256, &[1, 2, 3, 4])],
        compression: false,
        version: "1.0".into(),
    };

    let err = receive_file(
        &descriptor,
        &dir.join("out"),
        &ReceiveOptions::default(),
        &ProgressCounters::new(1),
    )
    .await
    .unwrap_err();

    assert!(
        matches!(
            err,
            TransferError::SizeMismatch {
                chunk_id: 0,
                announced: 3,
                expected: 4,
            }
        ),
        "got {err:?}"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

/// A port already held by someone else fails the sender at bind time.
#[tokio::test]
async fn occupied_port_fails_sender_creation() {
    let dir = test_dir("bind");
    let src = dir.join("f.bin");
    std::fs::write(&src, b"payload").unwrap();

    let base_port = 46151;
    let _squatter = TcpListener::bind(("0.0.0.0", base_port)).await.unwrap();

    let opts = SendOptions::new(1, base_port);
    let err = send_file(&src, &opts, &ProgressCounters::new(1))
        .await
        .unwrap_err();
    assert!(
        matches!(err, TransferError::Bind { port, .. } if port == base_port),
        "got {err:?}"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

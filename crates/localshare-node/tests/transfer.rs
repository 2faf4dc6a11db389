mod common;

use std::time::Duration;

use tokio::sync::mpsc;

use localshare_net::{TransferError, TransferEvent, TransferOutcome};
use localshare_node::Node;
use localshare_shared::constants::{SYS_CHUNK_SIZE, SYS_DOWNLOAD_CONCURRENCY};
use localshare_shared::types::MessageKind;

use common::{as_path, blake3_hex, pattern, read, start_node, wait_until, FakePeer};

const MIB: usize = 1024 * 1024;
const KIB: usize = 1024;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sent_file_is_downloaded_in_three_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let sender = start_node(dir.path(), "sender").await;
    let receiver = start_node(dir.path(), "receiver").await;
    sender.handshaker.exchange(receiver.local_addr()).await.unwrap();

    let data = pattern(25 * MIB, 7);
    let source = dir.path().join("movie.mkv");
    std::fs::write(&source, &data).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    receiver.notifications.progress.subscribe(move |event: &TransferEvent| {
        if !matches!(event, TransferEvent::Progress { .. }) {
            let _ = tx.send(event.clone());
        }
    });

    let peer_id = sender
        .store
        .find_device_by_client_code(&receiver.descriptor().client_code)
        .await
        .unwrap()
        .unwrap()
        .id
        .unwrap();
    let sent = sender
        .send(peer_id, Some("here you go".into()), Some(source.as_path()))
        .await
        .unwrap();
    assert_eq!(sent.kind, MessageKind::Send);

    let event = tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("transfer finished")
        .unwrap();
    let TransferEvent::Completed { message_id, save_path } = event else {
        panic!("transfer failed: {event:?}");
    };

    assert_eq!(read(&save_path), data);
    assert_eq!(save_path.file_name().unwrap(), "movie.mkv");

    let message = receiver.store.message(message_id).await.unwrap();
    assert!(message.download_success);
    assert_eq!(message.download_size, data.len() as u64);
    assert_eq!(message.opposite_id, sent.id);
    assert_eq!(message.content.as_deref(), Some("here you go"));

    let parts = receiver
        .store
        .file_parts(message_id, &blake3_hex(&data))
        .await
        .unwrap();
    let bounds: Vec<(u64, u64)> = parts.iter().map(|p| (p.start, p.end)).collect();
    assert_eq!(
        bounds,
        vec![(0, 10_485_759), (10_485_760, 20_971_519), (20_971_520, 26_214_399)]
    );
    assert!(progress_is_idle(&receiver));
}

fn progress_is_idle(node: &Node) -> bool {
    node.transfers.progress_snapshot().is_empty()
}

/// 10 KiB chunks, so a 25 KiB file splits into three.
async fn small_chunks(node: &Node, concurrency: usize) {
    node.store
        .set_sys_value(SYS_CHUNK_SIZE, &(10 * KIB).to_string())
        .await
        .unwrap();
    node.store
        .set_sys_value(SYS_DOWNLOAD_CONCURRENCY, &concurrency.to_string())
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interrupted_transfer_resumes_with_missing_chunks_only() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), "rx").await;
    small_chunks(&node, 1).await;

    let data = pattern(25 * KIB, 3);
    let peer = FakePeer::spawn(data.clone()).await;
    let id = peer.announce_to(&node, "data.bin").await;

    peer.with(|s| s.fail_from = Some(20 * KIB as u64));
    let err = node.transfers.download(id).await.unwrap_err();
    assert!(matches!(err, TransferError::UnexpectedStatus { status: 500, .. }));
    assert_eq!(peer.take_ranges(), vec![(0, 10239), (10240, 20479), (20480, 25599)]);

    let after_failure = node.store.message(id).await.unwrap();
    assert!(!after_failure.download_success);
    assert_eq!(after_failure.download_size, 20 * KIB as u64);

    peer.with(|s| s.fail_from = None);
    let outcome = node.transfers.download(id).await.unwrap();
    let TransferOutcome::Completed(message) = outcome else {
        panic!("expected a completed transfer");
    };

    assert_eq!(peer.take_ranges(), vec![(20480, 25599)]);
    assert_eq!(message.save_path, after_failure.save_path);
    assert_eq!(read(as_path(&message.save_path)), data);
    assert_eq!(node.store.file_parts(id, &peer.hash()).await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn changed_remote_content_restarts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), "rx").await;
    small_chunks(&node, 1).await;

    let old = pattern(25 * KIB, 1);
    let peer = FakePeer::spawn(old.clone()).await;
    let id = peer.announce_to(&node, "doc.txt").await;
    let old_hash = peer.hash();

    peer.with(|s| s.fail_from = Some(20 * KIB as u64));
    node.transfers.download(id).await.unwrap_err();
    assert_eq!(node.store.file_parts(id, &old_hash).await.unwrap().len(), 2);
    let first_path = node.store.message(id).await.unwrap().save_path;
    peer.take_ranges();

    let new = pattern(25 * KIB, 2);
    peer.with(|s| {
        s.data = new.clone();
        s.fail_from = None;
    });
    let new_hash = peer.hash();
    assert_ne!(old_hash, new_hash);

    let TransferOutcome::Completed(message) = node.transfers.download(id).await.unwrap() else {
        panic!("expected a completed transfer");
    };

    assert_eq!(peer.take_ranges().len(), 3, "every chunk fetched again");
    assert_eq!(message.file_hash.as_deref(), Some(new_hash.as_str()));
    assert_eq!(message.save_path, first_path, "valid path is reused");
    assert_eq!(read(as_path(&message.save_path)), new);
    assert_eq!(node.store.file_parts(id, &new_hash).await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn content_switching_back_does_not_reuse_stale_parts() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), "rx").await;
    small_chunks(&node, 1).await;

    let first = pattern(25 * KIB, 11);
    let second = pattern(25 * KIB, 12);
    let peer = FakePeer::spawn(first.clone()).await;
    let id = peer.announce_to(&node, "notes.txt").await;
    let first_hash = peer.hash();

    peer.with(|s| s.fail_from = Some(20 * KIB as u64));
    node.transfers.download(id).await.unwrap_err();
    assert_eq!(node.store.file_parts(id, &first_hash).await.unwrap().len(), 2);

    // Second content overwrites the first chunk on disk, then fails.
    peer.with(|s| {
        s.data = second.clone();
        s.fail_from = Some(10 * KIB as u64);
    });
    let second_hash = peer.hash();
    node.transfers.download(id).await.unwrap_err();
    assert!(node.store.file_parts(id, &first_hash).await.unwrap().is_empty());
    assert_eq!(node.store.file_parts(id, &second_hash).await.unwrap().len(), 1);
    peer.take_ranges();

    peer.with(|s| {
        s.data = first.clone();
        s.fail_from = None;
    });
    let TransferOutcome::Completed(message) = node.transfers.download(id).await.unwrap() else {
        panic!("expected a completed transfer");
    };

    assert_eq!(peer.take_ranges(), vec![(0, 10239), (10240, 20479), (20480, 25599)]);
    assert_eq!(read(as_path(&message.save_path)), first);
    assert!(node.store.file_parts(id, &second_hash).await.unwrap().is_empty());
    assert_eq!(node.store.file_parts(id, &first_hash).await.unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chunk_size_change_discards_recorded_parts() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), "rx").await;
    small_chunks(&node, 1).await;

    let data = pattern(25 * KIB, 13);
    let peer = FakePeer::spawn(data.clone()).await;
    let id = peer.announce_to(&node, "video.mp4").await;

    peer.with(|s| s.fail_from = Some(20 * KIB as u64));
    node.transfers.download(id).await.unwrap_err();
    assert_eq!(node.store.message(id).await.unwrap().download_size, 20 * KIB as u64);
    peer.take_ranges();

    node.store
        .set_sys_value(SYS_CHUNK_SIZE, &(8 * KIB).to_string())
        .await
        .unwrap();
    peer.with(|s| s.fail_from = None);
    let TransferOutcome::Completed(message) = node.transfers.download(id).await.unwrap() else {
        panic!("expected a completed transfer");
    };

    let expected = vec![(0, 8191), (8192, 16383), (16384, 24575), (24576, 25599)];
    assert_eq!(peer.take_ranges(), expected);
    let bounds: Vec<(u64, u64)> = node
        .store
        .file_parts(id, &peer.hash())
        .await
        .unwrap()
        .iter()
        .map(|p| (p.start, p.end))
        .collect();
    assert_eq!(bounds, expected, "no overlapping parts from the old layout");
    assert_eq!(message.download_size, 25 * KIB as u64);
    assert_eq!(read(as_path(&message.save_path)), data);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn hash_mismatch_is_not_marked_successful() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), "rx").await;
    small_chunks(&node, 4).await;

    let data = pattern(25 * KIB, 9);
    let peer = FakePeer::spawn(data.clone()).await;
    peer.with(|s| s.advertised_hash = Some(blake3_hex(b"something else")));
    let id = peer.announce_to(&node, "image.png").await;

    let err = node.transfers.download(id).await.unwrap_err();
    assert!(matches!(err, TransferError::Integrity { .. }));

    let message = node.store.message(id).await.unwrap();
    assert!(!message.download_success);
    assert_eq!(message.download_size, 0);
    // Bytes stay on disk for inspection.
    assert_eq!(read(as_path(&message.save_path)), data);
    assert!(progress_is_idle(&node));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn short_chunk_fails_and_is_not_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), "rx").await;
    small_chunks(&node, 1).await;

    let peer = FakePeer::spawn(pattern(25 * KIB, 4)).await;
    peer.with(|s| s.truncate = true);
    let id = peer.announce_to(&node, "short.bin").await;

    let err = node.transfers.download(id).await.unwrap_err();
    assert!(matches!(
        err,
        TransferError::ShortRead { start: 0, end: 10239, expected: 10240, received: 5120 }
    ));
    assert!(node.store.file_parts(id, &peer.hash()).await.unwrap().is_empty());
    assert!(!node.store.message(id).await.unwrap().download_success);
    assert!(!node.transfers.is_running(id));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_request_for_running_transfer_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), "rx").await;
    small_chunks(&node, 10).await;

    let data = pattern(25 * KIB, 5);
    let peer = FakePeer::spawn(data.clone()).await;
    peer.with(|s| s.delay = Some(Duration::from_millis(300)));
    let id = peer.announce_to(&node, "slow.bin").await;

    let first = node.transfers.spawn_download(id);
    wait_until("transfer start", || node.transfers.is_running(id)).await;

    let second = node.transfers.download(id).await.unwrap();
    assert!(matches!(second, TransferOutcome::AlreadyRunning));

    first.await.unwrap();
    assert!(!node.transfers.is_running(id));
    assert_eq!(peer.take_ranges().len(), 3, "no chunk requested twice");

    let message = node.store.message(id).await.unwrap();
    assert!(message.download_success);
    assert_eq!(read(as_path(&message.save_path)), data);
}

#[tokio::test]
async fn unavailable_metadata_leaves_message_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), "rx").await;

    let peer = FakePeer::spawn(pattern(1000, 0)).await;
    peer.with(|s| s.info_status = Some(axum::http::StatusCode::NOT_FOUND));
    let id = peer.announce_to(&node, "gone.bin").await;

    let err = node.transfers.download(id).await.unwrap_err();
    assert!(matches!(err, TransferError::Metadata(_)));

    let message = node.store.message(id).await.unwrap();
    assert_eq!(message.save_path, None);
    assert_eq!(message.file_hash, None);
    assert!(peer.take_ranges().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn colliding_names_get_numbered() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node(dir.path(), "rx").await;

    let peer = FakePeer::spawn(pattern(3000, 6)).await;
    let first = peer.announce_to(&node, "report.pdf").await;
    let second = peer.announce_to(&node, "../report.pdf").await;

    let mut names = Vec::new();
    for id in [first, second] {
        let TransferOutcome::Completed(message) = node.transfers.download(id).await.unwrap() else {
            panic!("expected a completed transfer");
        };
        names.push(as_path(&message.save_path).file_name().unwrap().to_owned());
    }
    assert_eq!(names, ["report.pdf", "report(1).pdf"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn served_file_supports_ranges_and_disposition() {
    let dir = tempfile::tempdir().unwrap();
    let sender = start_node(dir.path(), "sender").await;
    let receiver = start_node(dir.path(), "receiver").await;
    sender.handshaker.exchange(receiver.local_addr()).await.unwrap();

    let source = dir.path().join("my file.txt");
    std::fs::write(&source, b"0123456789").unwrap();
    let peer_id = sender.store.devices().await.unwrap()[0].id.unwrap();
    let sent = sender.send(peer_id, None, Some(source.as_path())).await.unwrap();
    let sent_id = sent.id.unwrap();

    let client = reqwest::Client::new();
    let base = format!("http://{}", sender.local_addr());

    let info: localshare_shared::types::DownloadInfo = client
        .get(format!("{base}/downloadInfo?messageId={sent_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info.size, 10);
    assert_eq!(info.hash, blake3_hex(b"0123456789"));

    let response = client
        .get(format!("{base}/download?messageId={sent_id}"))
        .header(reqwest::header::RANGE, "bytes=2-5")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::PARTIAL_CONTENT);
    let disposition = response.headers()[reqwest::header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("my%20file.txt"), "{disposition}");
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"2345");
}

// Sync engine behavior across the online/offline boundary: live uploads,
// queue fallback, ordered replay, and the memory-only degraded mode.

mod common;

use chrono::Utc;
use common::{test_engine, FakeBlobStore, FakeRecordService, PRINCIPAL};
use scribe_capture::record::NewRecord;
use scribe_capture::sync::blob_path;
use scribe_capture::{Connectivity, LocalQueue, QueueOp, SyncOutcome};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tempfile::TempDir;

fn new_record(session_id: &str) -> NewRecord {
    NewRecord {
        session_id: session_id.to_string(),
        label: format!("Session {}", session_id),
        tag: 1,
        language: "auto".to_string(),
        chunk_count: 0,
    }
}

#[tokio::test]
async fn online_chunk_sync_uploads_and_sets_absolute_count() {
    let dir = TempDir::new().unwrap();
    let records = FakeRecordService::new();
    let blobs = FakeBlobStore::new();
    let engine = test_engine(
        records.clone(),
        blobs.clone(),
        LocalQueue::open(dir.path()),
        Connectivity::new(true),
    );

    engine.create_session(new_record("s-1")).await;
    let outcome = engine
        .sync_chunk("s-1", 1, b"wav-bytes".to_vec(), Utc::now(), 1)
        .await;

    assert_eq!(outcome, SyncOutcome::Acked);
    assert_eq!(blobs.paths(), vec![blob_path(PRINCIPAL, "s-1", 1)]);
    assert_eq!(records.chunk_count("s-1"), Some(1));
    assert_eq!(engine.pending_items().await, 0);
}

#[tokio::test]
async fn offline_work_queues_then_drains_in_order() {
    let dir = TempDir::new().unwrap();
    let records = FakeRecordService::new();
    let blobs = FakeBlobStore::new();
    let queue = LocalQueue::open(dir.path());
    let connectivity = Connectivity::new(false);
    let engine = test_engine(
        records.clone(),
        blobs.clone(),
        queue.clone(),
        connectivity.clone(),
    );

    assert_eq!(
        engine.create_session(new_record("s-1")).await,
        SyncOutcome::QueuedLocally
    );
    for n in 1..=2u32 {
        assert_eq!(
            engine
                .sync_chunk("s-1", n, vec![n as u8; 32], Utc::now(), n)
                .await,
            SyncOutcome::QueuedLocally
        );
    }

    // Nothing reached the remote, everything is durable locally.
    assert!(records.get("s-1").is_none());
    assert_eq!(blobs.blob_count(), 0);
    assert_eq!(queue.get_chunks("s-1").await.unwrap().len(), 2);
    // create + (upload + update) per chunk
    assert_eq!(engine.pending_items().await, 5);

    connectivity.set_online(true);
    engine.drain_queue().await;

    assert_eq!(engine.pending_items().await, 0);
    let record = records.get("s-1").unwrap();
    assert_eq!(record.chunk_count, 2);
    assert_eq!(
        blobs.paths(),
        vec![
            blob_path(PRINCIPAL, "s-1", 1),
            blob_path(PRINCIPAL, "s-1", 2)
        ]
    );
    // Uploaded chunks were cleaned out of local storage.
    assert!(queue.get_chunks("s-1").await.unwrap().is_empty());

    // The create landed before any counter update touched the record.
    let log = records.update_log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            ("s-1".to_string(), Some(1)),
            ("s-1".to_string(), Some(2))
        ]
    );
}

#[tokio::test]
async fn failing_item_blocks_its_session_until_next_drain() {
    let dir = TempDir::new().unwrap();
    let records = FakeRecordService::new();
    let blobs = FakeBlobStore::new();
    let queue = LocalQueue::open(dir.path());
    let connectivity = Connectivity::new(false);
    let engine = test_engine(
        records.clone(),
        blobs.clone(),
        queue.clone(),
        connectivity.clone(),
    );

    // Record already exists remotely; only counter updates are queued.
    records.insert(scribe_capture::SessionRecord {
        session_id: "s-1".to_string(),
        label: "Session s-1".to_string(),
        tag: 1,
        language: "auto".to_string(),
        chunk_count: 0,
        created_at: Utc::now(),
        completed_at: None,
        queued_completed_at: None,
        is_paused: false,
    });
    engine
        .sync_update(scribe_capture::RecordUpdate::chunk_count("s-1", 3))
        .await;
    engine
        .sync_update(scribe_capture::RecordUpdate::chunk_count("s-1", 4))
        .await;

    connectivity.set_online(true);
    records.fail_updates.store(1, Ordering::SeqCst);
    engine.drain_queue().await;

    // The first update failed, so the second stayed parked behind it.
    assert_eq!(engine.pending_items().await, 2);
    assert_eq!(records.chunk_count("s-1"), Some(0));

    engine.drain_queue().await;
    assert_eq!(engine.pending_items().await, 0);
    assert_eq!(records.chunk_count("s-1"), Some(4));

    // Updates were applied 3 then 4, never reordered.
    let log = records.update_log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            ("s-1".to_string(), Some(3)),
            ("s-1".to_string(), Some(4))
        ]
    );
}

#[tokio::test]
async fn replayed_upload_overwrites_instead_of_duplicating() {
    let dir = TempDir::new().unwrap();
    let records = FakeRecordService::new();
    let blobs = FakeBlobStore::new();
    let queue = LocalQueue::open(dir.path());
    let connectivity = Connectivity::new(true);
    let engine = test_engine(
        records.clone(),
        blobs.clone(),
        queue.clone(),
        connectivity.clone(),
    );

    engine.create_session(new_record("s-1")).await;

    // Blob lands but the counter update fails, so the whole chunk gets
    // queued and the upload will replay.
    records.fail_updates.store(1, Ordering::SeqCst);
    let outcome = engine
        .sync_chunk("s-1", 1, b"payload".to_vec(), Utc::now(), 1)
        .await;
    assert_eq!(outcome, SyncOutcome::QueuedLocally);
    assert_eq!(blobs.blob_count(), 1);

    engine.drain_queue().await;

    // Two puts to the same path, still exactly one blob.
    assert_eq!(blobs.put_log.lock().unwrap().len(), 2);
    assert_eq!(blobs.blob_count(), 1);
    assert_eq!(records.chunk_count("s-1"), Some(1));
    assert_eq!(engine.pending_items().await, 0);
}

#[tokio::test]
async fn unavailable_store_falls_back_to_memory() {
    let records = FakeRecordService::new();
    let blobs = FakeBlobStore::new();
    let connectivity = Connectivity::new(false);
    let engine = test_engine(
        records.clone(),
        blobs.clone(),
        LocalQueue::unavailable(),
        connectivity.clone(),
    );

    engine.create_session(new_record("s-1")).await;
    engine
        .sync_chunk("s-1", 1, b"held-in-memory".to_vec(), Utc::now(), 1)
        .await;
    assert_eq!(engine.pending_items().await, 3);

    connectivity.set_online(true);
    engine.drain_queue().await;

    assert_eq!(engine.pending_items().await, 0);
    assert_eq!(records.chunk_count("s-1"), Some(1));
    assert_eq!(blobs.paths(), vec![blob_path(PRINCIPAL, "s-1", 1)]);
}

#[tokio::test]
async fn concurrent_drains_coalesce() {
    let dir = TempDir::new().unwrap();
    let records = FakeRecordService::new();
    let blobs = FakeBlobStore::new();
    let queue = LocalQueue::open(dir.path());
    let connectivity = Connectivity::new(false);
    let engine = test_engine(
        records.clone(),
        blobs.clone(),
        queue.clone(),
        connectivity.clone(),
    );

    engine.create_session(new_record("s-1")).await;
    for n in 1..=3u32 {
        engine
            .sync_chunk("s-1", n, vec![0; 16], Utc::now(), n)
            .await;
    }

    connectivity.set_online(true);
    tokio::join!(engine.drain_queue(), engine.drain_queue());

    assert_eq!(engine.pending_items().await, 0);
    assert_eq!(records.chunk_count("s-1"), Some(3));
    assert_eq!(blobs.blob_count(), 3);
}

#[tokio::test]
async fn counter_never_regresses_while_drain_and_live_sync_race() {
    let dir = TempDir::new().unwrap();
    let records = FakeRecordService::new();
    let blobs = FakeBlobStore::new();
    let queue = LocalQueue::open(dir.path());
    let connectivity = Connectivity::new(true);
    let engine = test_engine(
        records.clone(),
        blobs.clone(),
        queue.clone(),
        connectivity.clone(),
    );

    engine.create_session(new_record("s-1")).await;

    // Interleave a drain pass with each live chunk, periodically forcing
    // the live upload to fail over to the queue. An enqueue landing while
    // a drain is rebuilding its pending set must keep the session marked,
    // or a later replay would roll the absolute counter back.
    for n in 1..=12u32 {
        if n % 3 == 1 {
            blobs.fail_puts.store(1, Ordering::SeqCst);
        }
        tokio::join!(
            engine.drain_queue(),
            engine.sync_chunk("s-1", n, vec![n as u8; 16], Utc::now(), n)
        );
    }

    // Settle: a pass may have been blocked by a scripted failure.
    engine.drain_queue().await;
    engine.drain_queue().await;

    assert_eq!(engine.pending_items().await, 0);
    assert_eq!(records.chunk_count("s-1"), Some(12));
    assert_eq!(blobs.blob_count(), 12);

    let counts: Vec<u32> = records
        .update_log
        .lock()
        .unwrap()
        .iter()
        .filter_map(|(_, c)| *c)
        .collect();
    assert!(
        counts.windows(2).all(|w| w[0] <= w[1]),
        "counter regressed: {:?}",
        counts
    );
    assert_eq!(*counts.last().unwrap(), 12);
}

#[tokio::test]
async fn watcher_drains_leftover_work_without_waiting_a_full_tick() {
    let dir = TempDir::new().unwrap();
    let records = FakeRecordService::new();
    let blobs = FakeBlobStore::new();

    // Work left behind by a previous process run.
    {
        let queue = LocalQueue::open(dir.path());
        queue
            .enqueue(QueueOp::CreateSession {
                record: new_record("s-old"),
            })
            .await
            .unwrap();
        queue
            .enqueue(QueueOp::UpdateSession {
                update: scribe_capture::RecordUpdate::chunk_count("s-old", 1),
            })
            .await
            .unwrap();
    }

    let queue = LocalQueue::open(dir.path());
    let engine = test_engine(
        records.clone(),
        blobs.clone(),
        queue.clone(),
        Connectivity::new(true),
    );

    // A long period must not delay the first pass: the interval's first
    // tick completes immediately, so leftovers replay right after spawn.
    engine.spawn_drain_watcher(Duration::from_secs(60));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while engine.pending_items().await > 0 {
        if tokio::time::Instant::now() > deadline {
            panic!("startup drain never ran");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(records.chunk_count("s-old"), Some(1));
}

#[tokio::test]
async fn live_traffic_queues_behind_pending_items_for_same_session() {
    let dir = TempDir::new().unwrap();
    let records = FakeRecordService::new();
    let blobs = FakeBlobStore::new();
    let queue = LocalQueue::open(dir.path());
    let connectivity = Connectivity::new(true);
    let engine = test_engine(
        records.clone(),
        blobs.clone(),
        queue.clone(),
        connectivity.clone(),
    );

    engine.create_session(new_record("s-1")).await;

    // Chunk 1 fails over to the queue.
    blobs.fail_puts.store(1, Ordering::SeqCst);
    engine
        .sync_chunk("s-1", 1, vec![1; 16], Utc::now(), 1)
        .await;

    // Chunk 2 must not be applied live while chunk 1 is parked, or the
    // absolute counter would later regress during the drain.
    let outcome = engine
        .sync_chunk("s-1", 2, vec![2; 16], Utc::now(), 2)
        .await;
    assert_eq!(outcome, SyncOutcome::QueuedLocally);
    assert_eq!(records.chunk_count("s-1"), Some(0));

    engine.drain_queue().await;
    assert_eq!(records.chunk_count("s-1"), Some(2));
    assert_eq!(blobs.blob_count(), 2);

    let counts: Vec<Option<u32>> = records
        .update_log
        .lock()
        .unwrap()
        .iter()
        .map(|(_, c)| *c)
        .collect();
    assert_eq!(counts, vec![Some(1), Some(2)]);
}

// Shared in-memory fakes for the remote collaborators.
//
// They mirror the contracts the core relies on: record creation is
// idempotent by session_id, counter updates are absolute last-writer-wins
// sets, blob uploads are upserts by path. Failure counters let tests
// script "fail N times, then succeed".

#![allow(dead_code)]

use chrono::Utc;
use scribe_capture::error::{CaptureError, Result};
use scribe_capture::{NewRecord, RecordService, RecordUpdate, SessionRecord};
use scribe_capture::{BlobStore, Connectivity, LocalQueue, SyncEngine};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct FakeRecordService {
    pub records: Mutex<HashMap<String, SessionRecord>>,
    /// Update calls applied, in order: (session_id, chunk_count)
    pub update_log: Mutex<Vec<(String, Option<u32>)>>,
    pub fail_creates: AtomicUsize,
    pub fail_updates: AtomicUsize,
}

impl FakeRecordService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, record: SessionRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.session_id.clone(), record);
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.records.lock().unwrap().get(session_id).cloned()
    }

    pub fn chunk_count(&self, session_id: &str) -> Option<u32> {
        self.get(session_id).map(|r| r.chunk_count)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait::async_trait]
impl RecordService for FakeRecordService {
    async fn create_record(&self, record: NewRecord) -> Result<SessionRecord> {
        if Self::take_failure(&self.fail_creates) {
            return Err(CaptureError::RemoteUnreachable(
                "scripted create failure".to_string(),
            ));
        }

        let mut records = self.records.lock().unwrap();
        // Idempotent by session_id: a duplicate create returns the
        // existing record instead of producing a second one.
        let entry = records
            .entry(record.session_id.clone())
            .or_insert_with(|| SessionRecord {
                session_id: record.session_id.clone(),
                label: record.label.clone(),
                tag: record.tag,
                language: record.language.clone(),
                chunk_count: record.chunk_count,
                created_at: Utc::now(),
                completed_at: None,
                queued_completed_at: None,
                is_paused: false,
            });
        Ok(entry.clone())
    }

    async fn update_record(&self, update: RecordUpdate) -> Result<SessionRecord> {
        if Self::take_failure(&self.fail_updates) {
            return Err(CaptureError::RemoteUnreachable(
                "scripted update failure".to_string(),
            ));
        }

        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&update.session_id).ok_or_else(|| {
            CaptureError::RemoteUnreachable(format!("no record {}", update.session_id))
        })?;

        if let Some(count) = update.chunk_count {
            record.chunk_count = count;
        }
        if let Some(label) = &update.label {
            record.label = label.clone();
        }
        if let Some(ts) = update.completed_at {
            record.completed_at = Some(ts);
        }
        if let Some(ts) = update.queued_completed_at {
            record.queued_completed_at = Some(ts);
        }
        if let Some(paused) = update.is_paused {
            record.is_paused = paused;
        }

        self.update_log
            .lock()
            .unwrap()
            .push((update.session_id.clone(), update.chunk_count));

        Ok(record.clone())
    }

    async fn list_records(&self) -> Result<Vec<SessionRecord>> {
        let mut records: Vec<SessionRecord> =
            self.records.lock().unwrap().values().cloned().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

#[derive(Default)]
pub struct FakeBlobStore {
    pub blobs: Mutex<HashMap<String, Vec<u8>>>,
    /// Every successful put, in order
    pub put_log: Mutex<Vec<String>>,
    pub fail_puts: AtomicUsize,
}

impl FakeBlobStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.blobs.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl BlobStore for FakeBlobStore {
    async fn put_blob(&self, path: &str, payload: Vec<u8>) -> Result<()> {
        if FakeRecordService::take_failure(&self.fail_puts) {
            return Err(CaptureError::RemoteUnreachable(
                "scripted upload failure".to_string(),
            ));
        }

        // Upsert by path: replaying an upload overwrites, never duplicates.
        self.blobs.lock().unwrap().insert(path.to_string(), payload);
        self.put_log.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

pub const PRINCIPAL: &str = "test-principal";

pub fn test_engine(
    records: Arc<FakeRecordService>,
    blobs: Arc<FakeBlobStore>,
    queue: LocalQueue,
    connectivity: Connectivity,
) -> Arc<SyncEngine> {
    Arc::new(SyncEngine::new(
        records,
        blobs,
        queue,
        connectivity,
        PRINCIPAL,
        Duration::from_secs(5),
    ))
}

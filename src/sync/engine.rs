use super::remote::{blob_path, BlobStore, Connectivity, RecordService};
use crate::error::{CaptureError, Result};
use crate::record::{NewRecord, RecordUpdate};
use crate::store::{LocalQueue, QueueOp};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// How a sync attempt resolved. `QueuedLocally` is success with deferred
/// durability, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The remote collaborators acknowledged the operation
    Acked,
    /// The operation was parked for replay when connectivity returns
    QueuedLocally,
}

/// An operation held in memory because the local queue itself is
/// unavailable (durability degraded). Chunk payloads ride along since
/// there is no stored chunk to point at.
struct MemItem {
    op: QueueOp,
    payload: Option<Vec<u8>>,
}

/// Stateless transformer between sequenced chunks and the remote
/// collaborators, with local-queue fallback. Invoked by both the
/// live-capture path and the queue-drain path; owns no session state.
pub struct SyncEngine {
    records: Arc<dyn RecordService>,
    blobs: Arc<dyn BlobStore>,
    queue: LocalQueue,
    connectivity: Connectivity,
    principal_id: String,
    /// Bound on one remote attempt before the chunk is forcibly queued
    remote_timeout: Duration,
    /// Coalesces re-entrant drains into a single logical pass
    drain_lock: Mutex<()>,
    /// Sessions with queued items; their live traffic routes straight to
    /// the queue so absolute counter updates cannot overtake each other
    pending_sessions: Mutex<HashSet<String>>,
    /// Memory-only fallback when the local queue is unavailable
    mem_pending: Mutex<Vec<MemItem>>,
}

impl SyncEngine {
    pub fn new(
        records: Arc<dyn RecordService>,
        blobs: Arc<dyn BlobStore>,
        queue: LocalQueue,
        connectivity: Connectivity,
        principal_id: impl Into<String>,
        remote_timeout: Duration,
    ) -> Self {
        Self {
            records,
            blobs,
            queue,
            connectivity,
            principal_id: principal_id.into(),
            remote_timeout,
            drain_lock: Mutex::new(()),
            pending_sessions: Mutex::new(HashSet::new()),
            mem_pending: Mutex::new(Vec::new()),
        }
    }

    pub fn record_service(&self) -> Arc<dyn RecordService> {
        Arc::clone(&self.records)
    }

    pub fn connectivity(&self) -> Connectivity {
        self.connectivity.clone()
    }

    /// Pending operation count (durable plus memory-held), for the
    /// "will sync when online" indicator.
    pub async fn pending_items(&self) -> usize {
        self.queue.pending().await + self.mem_pending.lock().await.len()
    }

    /// Upload one sequenced chunk and push the session's absolute chunk
    /// count. Failure or offline state degrades to local queueing; this
    /// never raises.
    pub async fn sync_chunk(
        &self,
        session_id: &str,
        chunk_number: u32,
        payload: Vec<u8>,
        captured_at: DateTime<Utc>,
        total_count: u32,
    ) -> SyncOutcome {
        let has_pending = self.pending_sessions.lock().await.contains(session_id);

        if self.connectivity.is_online() && !has_pending {
            let attempt = async {
                let path = blob_path(&self.principal_id, session_id, chunk_number);
                self.blobs.put_blob(&path, payload.clone()).await?;
                self.records
                    .update_record(RecordUpdate::chunk_count(session_id, total_count))
                    .await?;
                Ok::<(), CaptureError>(())
            };

            match tokio::time::timeout(self.remote_timeout, attempt).await {
                Ok(Ok(())) => {
                    debug!("Chunk {}-{} acked remotely", session_id, chunk_number);
                    return SyncOutcome::Acked;
                }
                Ok(Err(e)) => {
                    warn!(
                        "Remote sync failed for chunk {}-{}: {} (queueing locally)",
                        session_id, chunk_number, e
                    );
                }
                Err(_) => {
                    warn!(
                        "Remote sync timed out for chunk {}-{} (queueing locally)",
                        session_id, chunk_number
                    );
                }
            }
        }

        self.queue_chunk(session_id, chunk_number, payload, captured_at, total_count)
            .await;
        SyncOutcome::QueuedLocally
    }

    async fn queue_chunk(
        &self,
        session_id: &str,
        chunk_number: u32,
        payload: Vec<u8>,
        captured_at: DateTime<Utc>,
        total_count: u32,
    ) {
        // Held across the writes: a drain's pending-set rebuild lists the
        // queue under this same lock, so items enqueued here are either
        // seen by that listing or marked after the rebuild, never lost.
        let mut pending = self.pending_sessions.lock().await;
        pending.insert(session_id.to_string());

        let upload = QueueOp::UploadChunk {
            session_id: session_id.to_string(),
            chunk_number,
        };
        let update = QueueOp::UpdateSession {
            update: RecordUpdate::chunk_count(session_id, total_count),
        };

        let stored = self
            .queue
            .put_chunk(session_id, chunk_number, &payload, captured_at)
            .await;

        match stored {
            Ok(()) => {
                if let Err(e) = self.queue.enqueue(upload).await {
                    error!("Failed to enqueue chunk upload: {}", e);
                }
                if let Err(e) = self.queue.enqueue(update).await {
                    error!("Failed to enqueue counter update: {}", e);
                }
            }
            Err(e) => {
                // Durability degraded: hold the work in memory so it can
                // still replay within this process lifetime.
                error!(
                    "Local queue unavailable for chunk {}-{}: {} (memory-only)",
                    session_id, chunk_number, e
                );
                let mut mem = self.mem_pending.lock().await;
                mem.push(MemItem {
                    op: upload,
                    payload: Some(payload),
                });
                mem.push(MemItem {
                    op: update,
                    payload: None,
                });
            }
        }
    }

    /// Create the remote session record, queueing the create when offline
    /// or unreachable.
    pub async fn create_session(&self, record: NewRecord) -> SyncOutcome {
        if self.connectivity.is_online() {
            match tokio::time::timeout(
                self.remote_timeout,
                self.records.create_record(record.clone()),
            )
            .await
            {
                Ok(Ok(_)) => {
                    info!("Session record {} created", record.session_id);
                    return SyncOutcome::Acked;
                }
                Ok(Err(e)) => warn!(
                    "Failed to create record {}: {} (queueing)",
                    record.session_id, e
                ),
                Err(_) => warn!(
                    "Record create timed out for {} (queueing)",
                    record.session_id
                ),
            }
        }

        self.queue_op(QueueOp::CreateSession { record }).await;
        SyncOutcome::QueuedLocally
    }

    /// Apply a session metadata update (rename, pause flag, completion
    /// bookkeeping), queueing when offline or unreachable.
    pub async fn sync_update(&self, update: RecordUpdate) -> SyncOutcome {
        let has_pending = self
            .pending_sessions
            .lock()
            .await
            .contains(&update.session_id);

        if self.connectivity.is_online() && !has_pending {
            match tokio::time::timeout(
                self.remote_timeout,
                self.records.update_record(update.clone()),
            )
            .await
            {
                Ok(Ok(_)) => return SyncOutcome::Acked,
                Ok(Err(e)) => warn!(
                    "Failed to update record {}: {} (queueing)",
                    update.session_id, e
                ),
                Err(_) => warn!(
                    "Record update timed out for {} (queueing)",
                    update.session_id
                ),
            }
        }

        self.queue_op(QueueOp::UpdateSession { update }).await;
        SyncOutcome::QueuedLocally
    }

    async fn queue_op(&self, op: QueueOp) {
        // Same locking discipline as queue_chunk.
        let mut pending = self.pending_sessions.lock().await;
        pending.insert(op.session_id().to_string());

        if let Err(e) = self.queue.enqueue(op.clone()).await {
            error!("Local queue unavailable: {} (memory-only)", e);
            self.mem_pending
                .lock()
                .await
                .push(MemItem { op, payload: None });
        }
    }

    /// Replay queued operations in enqueue order.
    ///
    /// Re-entrant calls while a drain is running are coalesced into the
    /// pass already in flight. An item failure blocks the rest of its
    /// session (ordering must hold) but other sessions keep draining.
    pub async fn drain_queue(&self) {
        let _guard = match self.drain_lock.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                debug!("Drain already in progress, coalescing");
                return;
            }
        };

        if !self.connectivity.is_online() {
            debug!("Skipping drain while offline");
            return;
        }

        let items = match self.queue.list_queue().await {
            Ok(items) => items,
            Err(e) => {
                warn!("Cannot list local queue: {}", e);
                Vec::new()
            }
        };

        let mut blocked: HashSet<String> = HashSet::new();
        let mut applied = 0usize;

        for item in items {
            let session_id = item.op.session_id().to_string();
            if blocked.contains(&session_id) {
                continue;
            }

            match self.apply_op(&item.op, None).await {
                Ok(()) => {
                    applied += 1;
                    if let Err(e) = self.queue.dequeue(item.id).await {
                        warn!("Failed to dequeue item {}: {}", item.id, e);
                    }
                    // Cleanup is best-effort; a leftover chunk re-uploads
                    // harmlessly thanks to upsert semantics.
                    if let QueueOp::UploadChunk {
                        session_id,
                        chunk_number,
                    } = &item.op
                    {
                        if let Err(e) = self.queue.delete_chunk(session_id, *chunk_number).await {
                            warn!("Chunk cleanup failed: {}", e);
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Drain halted for session {} at item {}: {}",
                        session_id, item.id, e
                    );
                    blocked.insert(session_id);
                }
            }
        }

        // Memory-held items replay after the durable ones; within a
        // session they were produced later, so order is preserved.
        let mem_items: Vec<MemItem> = std::mem::take(&mut *self.mem_pending.lock().await);
        let mut mem_failed = Vec::new();
        for item in mem_items {
            let session_id = item.op.session_id().to_string();
            if blocked.contains(&session_id) {
                mem_failed.push(item);
                continue;
            }
            match self.apply_op(&item.op, item.payload.as_deref()).await {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!("Memory-held replay failed for {}: {}", session_id, e);
                    blocked.insert(session_id);
                    mem_failed.push(item);
                }
            }
        }
        if !mem_failed.is_empty() {
            self.mem_pending.lock().await.extend(mem_failed);
        }

        // Recompute which sessions still have parked work. The lock is
        // taken before the listing so an enqueue racing this pass either
        // lands in the listing or re-marks its session after the rebuild;
        // clearing from a stale snapshot would let the next live chunk
        // overtake a queued counter update.
        let mut pending = self.pending_sessions.lock().await;
        let remaining = self.queue.list_queue().await.unwrap_or_default();
        pending.clear();
        for item in &remaining {
            pending.insert(item.op.session_id().to_string());
        }
        for item in self.mem_pending.lock().await.iter() {
            pending.insert(item.op.session_id().to_string());
        }

        if applied > 0 || !remaining.is_empty() {
            info!(
                "Drain pass complete: {} applied, {} still queued",
                applied,
                remaining.len()
            );
        }
    }

    /// Re-attempt one queued operation against the remote collaborators.
    async fn apply_op(&self, op: &QueueOp, inline_payload: Option<&[u8]>) -> Result<()> {
        match op {
            QueueOp::CreateSession { record } => {
                self.records.create_record(record.clone()).await?;
                Ok(())
            }
            QueueOp::UpdateSession { update } => {
                self.records.update_record(update.clone()).await?;
                Ok(())
            }
            QueueOp::UploadChunk {
                session_id,
                chunk_number,
            } => {
                let payload = match inline_payload {
                    Some(bytes) => bytes.to_vec(),
                    None => {
                        let chunks = self.queue.get_chunks(session_id).await?;
                        match chunks.into_iter().find(|c| c.chunk_number == *chunk_number) {
                            Some(chunk) => chunk.payload().map_err(|e| {
                                CaptureError::StorageUnavailable(format!(
                                    "corrupt stored chunk {}-{}: {}",
                                    session_id, chunk_number, e
                                ))
                            })?,
                            None => {
                                // Already uploaded and cleaned up earlier.
                                debug!(
                                    "Chunk {}-{} absent from store, skipping",
                                    session_id, chunk_number
                                );
                                return Ok(());
                            }
                        }
                    }
                };

                let path = blob_path(&self.principal_id, session_id, *chunk_number);
                self.blobs.put_blob(&path, payload).await
            }
        }
    }

    /// Background task that drains on each offline-to-online edge plus a
    /// coarse periodic tick (never a tight loop).
    pub fn spawn_drain_watcher(self: &Arc<Self>, tick: Duration) {
        let engine = Arc::clone(self);
        let mut online_rx = self.connectivity.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if *online_rx.borrow() {
                            info!("Connectivity restored, draining queue");
                            engine.drain_queue().await;
                        }
                    }
                    _ = interval.tick() => {
                        if engine.connectivity.is_online()
                            && engine.pending_items().await > 0
                        {
                            engine.drain_queue().await;
                        }
                    }
                }
            }
        });
    }
}

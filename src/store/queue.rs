use super::{chunk_key, QueueItem, QueueOp, StoredChunk};
use crate::error::{CaptureError, Result};
use base64::Engine;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Result of a best-effort batch delete.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOutcome {
    pub deleted: usize,
    pub failed: usize,
}

enum Request {
    PutChunk {
        chunk: StoredChunk,
        reply: oneshot::Sender<std::result::Result<(), String>>,
    },
    GetChunks {
        session_id: String,
        reply: oneshot::Sender<std::result::Result<Vec<StoredChunk>, String>>,
    },
    DeleteChunk {
        session_id: String,
        chunk_number: u32,
        reply: oneshot::Sender<std::result::Result<(), String>>,
    },
    DeleteChunks {
        session_id: String,
        reply: oneshot::Sender<DeleteOutcome>,
    },
    Enqueue {
        op: QueueOp,
        reply: oneshot::Sender<std::result::Result<u64, String>>,
    },
    ListQueue {
        reply: oneshot::Sender<std::result::Result<Vec<QueueItem>, String>>,
    },
    Dequeue {
        id: u64,
        reply: oneshot::Sender<std::result::Result<(), String>>,
    },
}

/// Handle to the local durable queue.
///
/// Cheap to clone; all clones share the single worker task spawned by
/// `open`, which is the sole owner of the storage directory. Opening
/// fails soft: an unavailable handle resolves every operation to
/// `StorageUnavailable`, which callers treat as "durability degraded",
/// never as a fatal error.
#[derive(Clone)]
pub struct LocalQueue {
    tx: Option<mpsc::Sender<Request>>,
}

impl LocalQueue {
    /// Open (or create) the store rooted at `dir` and spawn its worker.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        match Worker::init(dir.clone()) {
            Ok(worker) => {
                let (tx, rx) = mpsc::channel(256);
                tokio::spawn(worker.run(rx));
                info!("Local queue opened at {}", dir.display());
                Self { tx: Some(tx) }
            }
            Err(e) => {
                error!(
                    "Failed to open local queue at {}: {} (durability degraded)",
                    dir.display(),
                    e
                );
                Self { tx: None }
            }
        }
    }

    /// A handle with no backing storage; every operation degrades.
    pub fn unavailable() -> Self {
        Self { tx: None }
    }

    pub fn is_available(&self) -> bool {
        self.tx.is_some()
    }

    async fn send(&self, req: Request) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| CaptureError::StorageUnavailable("store not open".to_string()))?;
        tx.send(req)
            .await
            .map_err(|_| CaptureError::StorageUnavailable("store worker gone".to_string()))
    }

    /// Persist one chunk, overwriting any existing chunk with the same
    /// `(session_id, chunk_number)` identity. The payload is base64
    /// encoded here, before the write request is issued, so the worker
    /// never interleaves async preparation with storage writes.
    pub async fn put_chunk(
        &self,
        session_id: &str,
        chunk_number: u32,
        payload: &[u8],
        captured_at: DateTime<Utc>,
    ) -> Result<()> {
        let chunk = StoredChunk {
            session_id: session_id.to_string(),
            chunk_number,
            payload_b64: base64::engine::general_purpose::STANDARD.encode(payload),
            captured_at,
        };

        let (reply, rx) = oneshot::channel();
        self.send(Request::PutChunk { chunk, reply }).await?;
        recv(rx).await?.map_err(CaptureError::StorageUnavailable)
    }

    /// All locally-held chunks for a session, ascending by chunk number.
    pub async fn get_chunks(&self, session_id: &str) -> Result<Vec<StoredChunk>> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::GetChunks {
            session_id: session_id.to_string(),
            reply,
        })
        .await?;
        recv(rx).await?.map_err(CaptureError::StorageUnavailable)
    }

    /// Remove a single confirmed-uploaded chunk. Missing chunks are fine.
    pub async fn delete_chunk(&self, session_id: &str, chunk_number: u32) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::DeleteChunk {
            session_id: session_id.to_string(),
            chunk_number,
            reply,
        })
        .await?;
        recv(rx).await?.map_err(CaptureError::StorageUnavailable)
    }

    /// Best-effort batch delete of a session's chunks. Partial failure is
    /// acceptable; this never errors.
    pub async fn delete_chunks(&self, session_id: &str) -> DeleteOutcome {
        let (reply, rx) = oneshot::channel();
        if self
            .send(Request::DeleteChunks {
                session_id: session_id.to_string(),
                reply,
            })
            .await
            .is_err()
        {
            return DeleteOutcome::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Append a pending remote operation; returns its drain-order id.
    pub async fn enqueue(&self, op: QueueOp) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Enqueue { op, reply }).await?;
        recv(rx).await?.map_err(CaptureError::StorageUnavailable)
    }

    /// Pending operations in enqueue order.
    pub async fn list_queue(&self) -> Result<Vec<QueueItem>> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::ListQueue { reply }).await?;
        recv(rx).await?.map_err(CaptureError::StorageUnavailable)
    }

    /// Remove a completed operation. Removing an absent id is a no-op.
    pub async fn dequeue(&self, id: u64) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Dequeue { id, reply }).await?;
        recv(rx).await?.map_err(CaptureError::StorageUnavailable)
    }

    /// Pending item count for status reporting; 0 when unavailable.
    pub async fn pending(&self) -> usize {
        self.list_queue().await.map(|q| q.len()).unwrap_or(0)
    }
}

async fn recv<T>(rx: oneshot::Receiver<T>) -> Result<T> {
    rx.await
        .map_err(|_| CaptureError::StorageUnavailable("store worker dropped reply".to_string()))
}

/// Owns the storage directory. Runs until every handle is dropped.
struct Worker {
    chunks_dir: PathBuf,
    queue_dir: PathBuf,
    next_id: u64,
}

impl Worker {
    fn init(dir: PathBuf) -> anyhow::Result<Self> {
        let chunks_dir = dir.join("chunks");
        let queue_dir = dir.join("queue");
        fs::create_dir_all(&chunks_dir)?;
        fs::create_dir_all(&queue_dir)?;

        // Resume id assignment after the highest id already on disk.
        let mut next_id = 1u64;
        for entry in fs::read_dir(&queue_dir)? {
            let name = entry?.file_name();
            if let Some(id) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<u64>().ok())
            {
                next_id = next_id.max(id + 1);
            }
        }

        Ok(Self {
            chunks_dir,
            queue_dir,
            next_id,
        })
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Request>) {
        while let Some(req) = rx.recv().await {
            match req {
                Request::PutChunk { chunk, reply } => {
                    let _ = reply.send(self.put_chunk(chunk));
                }
                Request::GetChunks { session_id, reply } => {
                    let _ = reply.send(self.get_chunks(&session_id));
                }
                Request::DeleteChunk {
                    session_id,
                    chunk_number,
                    reply,
                } => {
                    let _ = reply.send(self.delete_chunk(&session_id, chunk_number));
                }
                Request::DeleteChunks { session_id, reply } => {
                    let _ = reply.send(self.delete_chunks(&session_id));
                }
                Request::Enqueue { op, reply } => {
                    let _ = reply.send(self.enqueue(op));
                }
                Request::ListQueue { reply } => {
                    let _ = reply.send(self.list_queue());
                }
                Request::Dequeue { id, reply } => {
                    let _ = reply.send(self.dequeue(id));
                }
            }
        }
        debug!("Local queue worker shutting down");
    }

    fn chunk_path(&self, session_id: &str, chunk_number: u32) -> PathBuf {
        self.chunks_dir
            .join(format!("{}.json", chunk_key(session_id, chunk_number)))
    }

    fn put_chunk(&self, chunk: StoredChunk) -> std::result::Result<(), String> {
        let path = self.chunks_dir.join(format!("{}.json", chunk.key()));
        let bytes =
            serde_json::to_vec(&chunk).map_err(|e| format!("failed to serialize chunk: {}", e))?;
        fs::write(&path, bytes).map_err(|e| format!("failed to write {}: {}", path.display(), e))
    }

    fn read_chunks(&self) -> std::result::Result<Vec<StoredChunk>, String> {
        let mut chunks = Vec::new();
        let entries = fs::read_dir(&self.chunks_dir)
            .map_err(|e| format!("failed to read chunk dir: {}", e))?;

        for entry in entries {
            let path = match entry {
                Ok(e) => e.path(),
                Err(e) => {
                    warn!("Skipping unreadable chunk entry: {}", e);
                    continue;
                }
            };
            match fs::read(&path).map_err(|e| e.to_string()).and_then(|bytes| {
                serde_json::from_slice::<StoredChunk>(&bytes).map_err(|e| e.to_string())
            }) {
                Ok(chunk) => chunks.push(chunk),
                Err(e) => warn!("Skipping corrupt chunk file {}: {}", path.display(), e),
            }
        }

        Ok(chunks)
    }

    fn get_chunks(&self, session_id: &str) -> std::result::Result<Vec<StoredChunk>, String> {
        let mut chunks: Vec<StoredChunk> = self
            .read_chunks()?
            .into_iter()
            .filter(|c| c.session_id == session_id)
            .collect();
        chunks.sort_by_key(|c| c.chunk_number);
        Ok(chunks)
    }

    fn delete_chunk(
        &self,
        session_id: &str,
        chunk_number: u32,
    ) -> std::result::Result<(), String> {
        let path = self.chunk_path(session_id, chunk_number);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("failed to delete {}: {}", path.display(), e)),
        }
    }

    fn delete_chunks(&self, session_id: &str) -> DeleteOutcome {
        let chunks = match self.get_chunks(session_id) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!("Chunk cleanup listing failed for {}: {}", session_id, e);
                return DeleteOutcome::default();
            }
        };

        let mut outcome = DeleteOutcome::default();
        for chunk in chunks {
            match self.delete_chunk(session_id, chunk.chunk_number) {
                Ok(()) => outcome.deleted += 1,
                Err(e) => {
                    warn!("Chunk cleanup failed: {}", e);
                    outcome.failed += 1;
                }
            }
        }

        debug!(
            "Chunk cleanup for {}: {} deleted, {} failed",
            session_id, outcome.deleted, outcome.failed
        );
        outcome
    }

    fn enqueue(&mut self, op: QueueOp) -> std::result::Result<u64, String> {
        let item = QueueItem {
            id: self.next_id,
            op,
            enqueued_at: Utc::now(),
        };

        let path = self.queue_dir.join(format!("{:020}.json", item.id));
        let bytes =
            serde_json::to_vec(&item).map_err(|e| format!("failed to serialize item: {}", e))?;
        fs::write(&path, bytes)
            .map_err(|e| format!("failed to write {}: {}", path.display(), e))?;

        self.next_id += 1;
        Ok(item.id)
    }

    fn list_queue(&self) -> std::result::Result<Vec<QueueItem>, String> {
        let mut items = Vec::new();
        let entries = fs::read_dir(&self.queue_dir)
            .map_err(|e| format!("failed to read queue dir: {}", e))?;

        for entry in entries {
            let path = match entry {
                Ok(e) => e.path(),
                Err(e) => {
                    warn!("Skipping unreadable queue entry: {}", e);
                    continue;
                }
            };
            match fs::read(&path).map_err(|e| e.to_string()).and_then(|bytes| {
                serde_json::from_slice::<QueueItem>(&bytes).map_err(|e| e.to_string())
            }) {
                Ok(item) => items.push(item),
                Err(e) => warn!("Skipping corrupt queue file {}: {}", path.display(), e),
            }
        }

        items.sort_by_key(|i| i.id);
        Ok(items)
    }

    fn dequeue(&self, id: u64) -> std::result::Result<(), String> {
        let path = self.queue_dir.join(format!("{:020}.json", id));
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("failed to dequeue {}: {}", id, e)),
        }
    }
}

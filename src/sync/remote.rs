use crate::error::Result;
use crate::record::{NewRecord, RecordUpdate, SessionRecord};
use std::sync::Arc;
use tokio::sync::watch;

/// Transcript record service (consumed collaborator).
///
/// Scoped to the authenticated principal on the service side. Creates
/// are idempotent by `session_id`; counter updates are last-writer-wins
/// absolute sets.
#[async_trait::async_trait]
pub trait RecordService: Send + Sync {
    async fn create_record(&self, record: NewRecord) -> Result<SessionRecord>;

    async fn update_record(&self, update: RecordUpdate) -> Result<SessionRecord>;

    /// Records owned by the principal, newest first.
    async fn list_records(&self) -> Result<Vec<SessionRecord>>;
}

/// Blob storage service (consumed collaborator).
///
/// Upsert-by-path: repeating an upload leaves exactly one blob holding
/// the latest content, which is what makes at-least-once queue replay
/// safe.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_blob(&self, path: &str, payload: Vec<u8>) -> Result<()>;
}

/// Upload path convention: `{principalId}/{sessionId}-{chunkNumber}.wav`.
/// The service rejects paths outside the caller's own prefix.
pub fn blob_path(principal_id: &str, session_id: &str, chunk_number: u32) -> String {
    format!("{}/{}-{}.wav", principal_id, session_id, chunk_number)
}

/// Boolean connectivity observable the sync engine subscribes to.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn set_online(&self, online: bool) {
        // send_if_modified keeps edge subscribers from seeing repeats
        self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

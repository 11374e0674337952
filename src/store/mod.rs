//! Local Durable Queue
//!
//! On-device persistence for chunks pending upload and remote operations
//! pending connectivity. Survives process restarts; outlives any single
//! recording session. All reads and writes funnel through one worker
//! task that exclusively owns the storage directory, so there is a
//! single writer no matter how many handles are cloned.

mod queue;

pub use queue::{DeleteOutcome, LocalQueue};

use crate::record::{NewRecord, RecordUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chunk persisted locally because remote upload failed or the device
/// was offline. Identity is `(session_id, chunk_number)`; re-saving the
/// same identity overwrites rather than duplicates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChunk {
    pub session_id: String,
    pub chunk_number: u32,
    /// Audio payload, base64-encoded before the write was issued
    pub payload_b64: String,
    pub captured_at: DateTime<Utc>,
}

impl StoredChunk {
    /// Primary key: `"{sessionId}-{chunkNumber}"`.
    pub fn key(&self) -> String {
        chunk_key(&self.session_id, self.chunk_number)
    }

    /// Decode the stored payload back to raw bytes.
    pub fn payload(&self) -> anyhow::Result<Vec<u8>> {
        use base64::Engine;
        Ok(base64::engine::general_purpose::STANDARD.decode(&self.payload_b64)?)
    }
}

pub fn chunk_key(session_id: &str, chunk_number: u32) -> String {
    format!("{}-{}", session_id, chunk_number)
}

/// A remote operation awaiting connectivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// Auto-assigned, strictly increasing; drain order
    pub id: u64,
    pub op: QueueOp,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QueueOp {
    CreateSession { record: NewRecord },
    UpdateSession { update: RecordUpdate },
    UploadChunk { session_id: String, chunk_number: u32 },
}

impl QueueOp {
    pub fn session_id(&self) -> &str {
        match self {
            QueueOp::CreateSession { record } => &record.session_id,
            QueueOp::UpdateSession { update } => &update.session_id,
            QueueOp::UploadChunk { session_id, .. } => session_id,
        }
    }
}

//! Transcript record model
//!
//! The shapes exchanged with the remote record service, mirrored locally
//! while a recording is active. The authoritative `chunk_count` lives on
//! the remote record; updates always carry absolute values so replays
//! cannot double-count.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One transcript session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Client-generated id; idempotency key for every chunk and metadata
    /// operation touching this session
    pub session_id: String,
    /// Human-assigned display text (renamable)
    pub label: String,
    /// Display ordinal among sessions created in one sitting
    pub tag: u32,
    /// Capture-locale hint
    pub language: String,
    /// Monotonically non-decreasing chunk counter
    pub chunk_count: u32,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub queued_completed_at: Option<DateTime<Utc>>,
    pub is_paused: bool,
}

impl SessionRecord {
    /// Derived finalization predicate: a session is final once it has a
    /// completion timestamp at least as new as any queued one, holds at
    /// least one chunk, and is not paused.
    pub fn is_final(&self) -> bool {
        let completed = match self.completed_at {
            Some(ts) => ts,
            None => return false,
        };
        let queued_ok = match self.queued_completed_at {
            Some(queued) => completed >= queued,
            None => true,
        };
        queued_ok && self.chunk_count > 0 && !self.is_paused
    }
}

/// Fields for creating a record. Idempotent by `session_id` on the
/// service side; duplicate creates must not produce duplicate records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    pub session_id: String,
    pub label: String,
    pub tag: u32,
    pub language: String,
    pub chunk_count: u32,
}

/// Partial update applied last-writer-wins on the service side.
/// `chunk_count` is an absolute value, never an increment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordUpdate {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_paused: Option<bool>,
}

impl RecordUpdate {
    pub fn chunk_count(session_id: &str, chunk_count: u32) -> Self {
        Self {
            session_id: session_id.to_string(),
            chunk_count: Some(chunk_count),
            label: None,
            completed_at: None,
            queued_completed_at: None,
            is_paused: None,
        }
    }
}

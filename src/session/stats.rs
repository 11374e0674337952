use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final statistics returned when a recording stops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// "new" or "addendum"
    pub mode: String,

    /// Session-wide chunk count (seed plus chunks from this recording)
    pub chunk_count: u32,

    /// Chunks captured during this recording alone
    pub chunks_recorded: u32,

    pub started_at: DateTime<Utc>,

    pub duration_secs: f64,

    /// Operations still awaiting connectivity
    pub pending_sync_items: usize,

    /// Whether the completion update reached the remote record, or was
    /// queued for later
    pub completed_remotely: bool,
}

/// Controller snapshot for status polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub state: String,
    pub session_id: Option<String>,
    pub label: Option<String>,
    pub chunk_count: u32,
    pub pending_sync_items: usize,
    pub online: bool,
    pub last_error: Option<String>,
}

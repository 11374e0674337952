use crate::config::CaptureConfig;
use crate::session::SessionController;
use crate::sync::SyncEngine;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The single session lifecycle controller
    pub controller: Arc<SessionController>,
    /// Sync engine, for queue status and connectivity
    pub engine: Arc<SyncEngine>,
    /// Capture settings applied when building audio backends
    pub capture: CaptureConfig,
}

impl AppState {
    pub fn new(
        controller: Arc<SessionController>,
        engine: Arc<SyncEngine>,
        capture: CaptureConfig,
    ) -> Self {
        Self {
            controller,
            engine,
            capture,
        }
    }
}

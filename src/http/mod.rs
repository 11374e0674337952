//! HTTP API server for external control (UI shells, voice-command hosts)
//!
//! Every caller goes through the same session-controller API:
//! - POST /sessions/start - Start a recording (new or addendum)
//! - POST /sessions/pause | /sessions/resume | /sessions/stop
//! - GET /sessions/status - Controller snapshot (incl. offline badge data)
//! - GET /sessions - List records owned by the principal
//! - POST /sessions/:id/label - Rename a session
//! - POST /connectivity - Host-reported online/offline signal
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;

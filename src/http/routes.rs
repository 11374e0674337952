use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/sessions/start", post(handlers::start_session))
        .route("/sessions/pause", post(handlers::pause_session))
        .route("/sessions/resume", post(handlers::resume_session))
        .route("/sessions/stop", post(handlers::stop_session))
        // Queries
        .route("/sessions/status", get(handlers::session_status))
        .route("/sessions", get(handlers::list_sessions))
        // Metadata
        .route(
            "/sessions/:session_id/label",
            post(handlers::rename_session),
        )
        // Host-provided connectivity signal
        .route("/connectivity", post(handlers::set_connectivity))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

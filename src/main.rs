use anyhow::{Context, Result};
use scribe_capture::{
    create_router, AppState, Config, Connectivity, ControllerConfig, HttpBlobStore,
    HttpRecordService, LocalQueue, SessionController, SyncEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = Config::load("config/scribe-capture")?;

    info!("scribe-capture v0.1.0");
    info!("Loaded config: {}", cfg.service.name);

    let queue = LocalQueue::open(cfg.storage.queue_path());
    let connectivity = Connectivity::new(true);

    let records = Arc::new(
        HttpRecordService::new(&cfg.remote).context("Failed to build record service client")?,
    );
    let blobs =
        Arc::new(HttpBlobStore::new(&cfg.remote).context("Failed to build blob store client")?);

    let engine = Arc::new(SyncEngine::new(
        records,
        blobs,
        queue,
        connectivity,
        cfg.remote.principal_id.clone(),
        Duration::from_secs(cfg.remote.timeout_secs),
    ));
    // Replay anything left over from a previous run once we're up, then
    // keep draining on connectivity edges and a coarse tick.
    engine.spawn_drain_watcher(Duration::from_secs(60));

    let controller = Arc::new(SessionController::new(
        Arc::clone(&engine),
        ControllerConfig::from_capture(&cfg.capture),
    ));

    let state = AppState::new(controller, engine, cfg.capture.clone());
    let router = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    info!("HTTP control API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, router)
        .await
        .context("HTTP server failed")?;

    Ok(())
}

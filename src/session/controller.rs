use super::config::ControllerConfig;
use super::stats::{ControllerStatus, SessionStats};
use crate::capture::{AudioBackend, CaptureEvent, CapturePipeline, PipelineConfig};
use crate::error::{CaptureError, Result};
use crate::record::{NewRecord, RecordUpdate};
use crate::sequence::{ChunkSequencer, SessionMode};
use crate::sync::{SyncEngine, SyncOutcome};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Controller lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Recording,
    Paused,
    Stopping,
    Error,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Recording => "recording",
            ControllerState::Paused => "paused",
            ControllerState::Stopping => "stopping",
            ControllerState::Error => "error",
        }
    }
}

/// Options for starting a recording
#[derive(Debug, Clone)]
pub struct StartOptions {
    pub mode: StartMode,
    pub label: Option<String>,
    pub language: Option<String>,
}

impl StartOptions {
    pub fn new_session() -> Self {
        Self {
            mode: StartMode::New,
            label: None,
            language: None,
        }
    }

    pub fn addendum(session_id: impl Into<String>, chunk_count: Option<u32>) -> Self {
        Self {
            mode: StartMode::Addendum {
                session_id: session_id.into(),
                chunk_count,
            },
            label: None,
            language: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum StartMode {
    /// Brand-new session: fresh id, numbering from 1
    New,
    /// Continue an existing session. `chunk_count` is the persisted
    /// count when the caller already knows it; otherwise it is looked up
    /// from the record service before any chunk is numbered.
    Addendum {
        session_id: String,
        chunk_count: Option<u32>,
    },
}

struct ActiveSession {
    session_id: String,
    label: String,
    mode: SessionMode,
    started_at: DateTime<Utc>,
    /// Chunk count the sequencer was seeded with
    seed: u32,
    /// Optimistic local mirror of the remote counter
    chunk_count: Arc<AtomicU32>,
}

struct Inner {
    state: ControllerState,
    active: Option<ActiveSession>,
    pipeline: Option<CapturePipeline>,
    chunk_task: Option<JoinHandle<u32>>,
    /// Set by the chunk task on unrecoverable capture failure
    failure: Arc<StdMutex<Option<String>>>,
    last_error: Option<String>,
    /// Tag fallback for sessions created while offline
    next_local_tag: u32,
}

/// Session lifecycle controller: the single public API surface.
///
/// Drives `idle → recording ⇄ paused → stopping → idle`, owns at most
/// one live capture pipeline, and serializes all state-changing calls on
/// one lock so e.g. a `pause` arriving during a still-resolving `start`
/// waits for it to settle. UI buttons and voice-command interpreters are
/// both just callers of this API.
pub struct SessionController {
    engine: Arc<SyncEngine>,
    config: ControllerConfig,
    inner: Mutex<Inner>,
}

impl SessionController {
    pub fn new(engine: Arc<SyncEngine>, config: ControllerConfig) -> Self {
        Self {
            engine,
            config,
            inner: Mutex::new(Inner {
                state: ControllerState::Idle,
                active: None,
                pipeline: None,
                chunk_task: None,
                failure: Arc::new(StdMutex::new(None)),
                last_error: None,
                next_local_tag: 1,
            }),
        }
    }

    /// Start recording. Returns the session id.
    ///
    /// A `start` while already recording is a no-op returning the
    /// current session id; the backend is acquired exactly once. Only
    /// `MicError` and `SequenceViolation` surface here; everything else
    /// degrades through the sync engine.
    pub async fn start(
        &self,
        opts: StartOptions,
        backend: Box<dyn AudioBackend>,
    ) -> Result<String> {
        let mut inner = self.inner.lock().await;
        self.observe_failure(&mut inner);

        match inner.state {
            ControllerState::Recording | ControllerState::Paused => {
                let session_id = inner
                    .active
                    .as_ref()
                    .map(|a| a.session_id.clone())
                    .unwrap_or_default();
                warn!("start() while already recording is a no-op");
                return Ok(session_id);
            }
            ControllerState::Stopping => {
                // Unreachable from outside: stop() holds the lock across
                // the whole transition.
                return Err(CaptureError::SequenceViolation(
                    "controller is stopping".to_string(),
                ));
            }
            ControllerState::Idle | ControllerState::Error => {}
        }

        let (active, sequencer) = match &opts.mode {
            StartMode::New => {
                let session_id = format!("session-{}", uuid::Uuid::new_v4());
                let tag = self.next_tag(&mut inner).await;
                let label = opts
                    .label
                    .clone()
                    .unwrap_or_else(|| format!("Recording {}", tag));
                let language = opts
                    .language
                    .clone()
                    .unwrap_or_else(|| self.config.default_language.clone());

                let outcome = self
                    .engine
                    .create_session(NewRecord {
                        session_id: session_id.clone(),
                        label: label.clone(),
                        tag,
                        language: language.clone(),
                        chunk_count: 0,
                    })
                    .await;
                debug!("Session {} create outcome: {:?}", session_id, outcome);

                (
                    ActiveSession {
                        session_id,
                        label,
                        mode: SessionMode::New,
                        started_at: Utc::now(),
                        seed: 0,
                        chunk_count: Arc::new(AtomicU32::new(0)),
                    },
                    ChunkSequencer::new_session(),
                )
            }
            StartMode::Addendum {
                session_id,
                chunk_count,
            } => {
                let seed = match chunk_count {
                    Some(count) => *count,
                    None => self.lookup_chunk_count(session_id).await?,
                };
                info!("Addendum for {} seeded at chunk {}", session_id, seed);

                (
                    ActiveSession {
                        session_id: session_id.clone(),
                        label: opts.label.clone().unwrap_or_default(),
                        mode: SessionMode::Addendum,
                        started_at: Utc::now(),
                        seed,
                        chunk_count: Arc::new(AtomicU32::new(seed)),
                    },
                    ChunkSequencer::addendum(seed),
                )
            }
        };

        // Single hardware acquisition, under the controller lock.
        let pipeline_config = PipelineConfig {
            chunk_duration: self.config.chunk_duration,
            sound_threshold: self.config.sound_threshold,
        };
        let (pipeline, events) = CapturePipeline::start(backend, pipeline_config).await?;

        *inner.failure.lock().unwrap() = None;
        inner.last_error = None;

        let chunk_task = tokio::spawn(run_chunks(
            Arc::clone(&self.engine),
            events,
            sequencer,
            active.session_id.clone(),
            Arc::clone(&active.chunk_count),
            Arc::clone(&inner.failure),
        ));

        info!(
            "Recording started: {} ({:?})",
            active.session_id, active.mode
        );

        let session_id = active.session_id.clone();
        inner.active = Some(active);
        inner.pipeline = Some(pipeline);
        inner.chunk_task = Some(chunk_task);
        inner.state = ControllerState::Recording;

        Ok(session_id)
    }

    /// Pause chunk emission without releasing the capture device.
    /// No-op unless recording.
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        self.observe_failure(&mut inner);

        if inner.state == ControllerState::Recording {
            if let Some(pipeline) = &inner.pipeline {
                pipeline.pause();
            }
            inner.state = ControllerState::Paused;
            info!("Recording paused");
        }
    }

    /// Resume a paused recording. No-op unless paused.
    pub async fn resume(&self) {
        let mut inner = self.inner.lock().await;
        self.observe_failure(&mut inner);

        if inner.state == ControllerState::Paused {
            if let Some(pipeline) = &inner.pipeline {
                pipeline.resume();
            }
            inner.state = ControllerState::Recording;
            info!("Recording resumed");
        }
    }

    /// Stop the recording: flush the pipeline, wait for the final
    /// chunk's sync to resolve (acked or queued), finalize the remote
    /// record and return stats. No-op returning `None` while idle or in
    /// the error state.
    pub async fn stop(&self) -> Result<Option<SessionStats>> {
        let mut inner = self.inner.lock().await;
        self.observe_failure(&mut inner);

        match inner.state {
            ControllerState::Recording | ControllerState::Paused => {}
            _ => {
                debug!("stop() with no active recording is a no-op");
                return Ok(None);
            }
        }

        inner.state = ControllerState::Stopping;

        if let Some(mut pipeline) = inner.pipeline.take() {
            pipeline.stop().await;
        }

        // The chunk task ends only after it has seen the terminal event,
        // so joining it waits out the final chunk's sync.
        let final_count = match inner.chunk_task.take() {
            Some(task) => match task.await {
                Ok(count) => count,
                Err(e) => {
                    error!("Chunk task panicked: {}", e);
                    inner
                        .active
                        .as_ref()
                        .map(|a| a.chunk_count.load(Ordering::SeqCst))
                        .unwrap_or(0)
                }
            },
            None => 0,
        };

        let active = match inner.active.take() {
            Some(active) => active,
            None => {
                inner.state = ControllerState::Idle;
                return Ok(None);
            }
        };

        let now = Utc::now();
        let outcome = self
            .engine
            .sync_update(RecordUpdate {
                session_id: active.session_id.clone(),
                chunk_count: Some(final_count),
                label: None,
                completed_at: Some(now),
                queued_completed_at: Some(now),
                is_paused: Some(false),
            })
            .await;

        let duration = now.signed_duration_since(active.started_at);

        let stats = SessionStats {
            session_id: active.session_id.clone(),
            mode: match active.mode {
                SessionMode::New => "new".to_string(),
                SessionMode::Addendum => "addendum".to_string(),
            },
            chunk_count: final_count,
            chunks_recorded: final_count.saturating_sub(active.seed),
            started_at: active.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            pending_sync_items: self.engine.pending_items().await,
            completed_remotely: outcome == SyncOutcome::Acked,
        };

        inner.state = ControllerState::Idle;
        info!(
            "Recording stopped: {} ({} chunks, completed_remotely={})",
            stats.session_id, stats.chunk_count, stats.completed_remotely
        );

        Ok(Some(stats))
    }

    /// Snapshot for status polling and the offline badge.
    pub async fn status(&self) -> ControllerStatus {
        let mut inner = self.inner.lock().await;
        self.observe_failure(&mut inner);

        ControllerStatus {
            state: inner.state.as_str().to_string(),
            session_id: inner.active.as_ref().map(|a| a.session_id.clone()),
            label: inner.active.as_ref().map(|a| a.label.clone()),
            chunk_count: inner
                .active
                .as_ref()
                .map(|a| a.chunk_count.load(Ordering::SeqCst))
                .unwrap_or(0),
            pending_sync_items: self.engine.pending_items().await,
            online: self.engine.connectivity().is_online(),
            last_error: inner.last_error.clone(),
        }
    }

    /// Rename a session's display label (live or historical).
    pub async fn rename(&self, session_id: &str, label: String) -> SyncOutcome {
        {
            let mut inner = self.inner.lock().await;
            if let Some(active) = inner.active.as_mut() {
                if active.session_id == session_id {
                    active.label = label.clone();
                }
            }
        }

        self.engine
            .sync_update(RecordUpdate {
                session_id: session_id.to_string(),
                chunk_count: None,
                label: Some(label),
                completed_at: None,
                queued_completed_at: None,
                is_paused: None,
            })
            .await
    }

    /// Fold a capture-task failure into controller state.
    fn observe_failure(&self, inner: &mut Inner) {
        let failure = inner.failure.lock().unwrap().take();
        if let Some(reason) = failure {
            error!("Capture failed: {}", reason);
            inner.last_error = Some(reason);
            inner.pipeline = None;
            inner.chunk_task = None;
            inner.active = None;
            inner.state = ControllerState::Error;
        }
    }

    /// Display ordinal for a new session: `max(existing tags) + 1`,
    /// falling back to a locally tracked counter while offline.
    async fn next_tag(&self, inner: &mut Inner) -> u32 {
        if self.engine.connectivity().is_online() {
            if let Ok(records) = self.engine.record_service().list_records().await {
                let tag = records.iter().map(|r| r.tag).max().unwrap_or(0) + 1;
                inner.next_local_tag = tag + 1;
                return tag;
            }
        }

        let tag = inner.next_local_tag;
        inner.next_local_tag += 1;
        tag
    }

    /// Addendum seed lookup. Blocks the start rather than guessing zero,
    /// which would overwrite existing chunk numbers.
    async fn lookup_chunk_count(&self, session_id: &str) -> Result<u32> {
        if !self.engine.connectivity().is_online() {
            return Err(CaptureError::SequenceViolation(format!(
                "chunk count for {} unknown while offline",
                session_id
            )));
        }

        let records = self
            .engine
            .record_service()
            .list_records()
            .await
            .map_err(|e| {
                CaptureError::SequenceViolation(format!(
                    "cannot load session metadata for {}: {}",
                    session_id, e
                ))
            })?;

        records
            .iter()
            .find(|r| r.session_id == session_id)
            .map(|r| r.chunk_count)
            .ok_or_else(|| {
                CaptureError::SequenceViolation(format!("unknown session {}", session_id))
            })
    }
}

/// Consumes capture events serially: numbers sound-bearing chunks, syncs
/// each one to resolution before touching the next (chunk N+1 never
/// overtakes N), and drops silent chunks unnumbered.
async fn run_chunks(
    engine: Arc<SyncEngine>,
    mut events: mpsc::Receiver<CaptureEvent>,
    mut sequencer: ChunkSequencer,
    session_id: String,
    counter: Arc<AtomicU32>,
    failure: Arc<StdMutex<Option<String>>>,
) -> u32 {
    while let Some(event) = events.recv().await {
        match event {
            CaptureEvent::Chunk {
                wav,
                sound_detected,
                captured_at,
            } => {
                if !sound_detected {
                    // Silent chunks carry no transcription value; they
                    // are not numbered and not persisted.
                    debug!("Dropping silent chunk for {}", session_id);
                    continue;
                }

                let number = sequencer.next();
                let total = sequencer.chunk_count();
                let outcome = engine
                    .sync_chunk(&session_id, number, wav, captured_at, total)
                    .await;
                counter.store(total, Ordering::SeqCst);
                debug!(
                    "Chunk {}-{} resolved: {:?}",
                    session_id, number, outcome
                );
            }
            CaptureEvent::Failed { reason } => {
                *failure.lock().unwrap() = Some(reason);
                break;
            }
            CaptureEvent::Stopped => break,
        }
    }

    sequencer.chunk_count()
}

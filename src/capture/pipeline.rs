use super::backend::{AudioBackend, AudioFrame};
use crate::error::MicError;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Audio-time length of each emitted chunk
    pub chunk_duration: Duration,
    /// Peak-amplitude threshold for the sound-presence heuristic
    pub sound_threshold: i16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::from_secs(5),
            sound_threshold: 500,
        }
    }
}

/// Events emitted by a running pipeline, in capture order.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// One chunk's worth of audio, WAV-encoded
    Chunk {
        wav: Vec<u8>,
        sound_detected: bool,
        captured_at: DateTime<Utc>,
    },
    /// Unrecoverable capture failure; no further events follow
    Failed { reason: String },
    /// Terminal event after the final buffered audio has been flushed
    Stopped,
}

/// Pipeline lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Capturing,
    Paused,
    Stopping,
    Stopped,
    Failed,
}

/// Capture pipeline: wraps an [`AudioBackend`] and segments its frame
/// stream into WAV chunks tagged with sound presence.
///
/// The backend handle is owned exclusively by the pipeline task and is
/// never exposed to callers. Pausing gates chunk emission without
/// stopping the backend, so resuming does not re-acquire the device.
/// After `stop()` the instance is dead; a new recording starts a fresh
/// pipeline.
pub struct CapturePipeline {
    state: Arc<Mutex<PipelineState>>,
    paused_tx: watch::Sender<bool>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl CapturePipeline {
    /// Acquire the backend and begin emitting [`CaptureEvent`]s.
    pub async fn start(
        mut backend: Box<dyn AudioBackend>,
        config: PipelineConfig,
    ) -> std::result::Result<(Self, mpsc::Receiver<CaptureEvent>), MicError> {
        let frames = backend.start().await?;

        info!(
            "Capture pipeline started (backend={}, chunk={}s)",
            backend.name(),
            config.chunk_duration.as_secs()
        );

        let (event_tx, event_rx) = mpsc::channel(64);
        let (paused_tx, paused_rx) = watch::channel(false);
        let (stop_tx, stop_rx) = watch::channel(false);
        let state = Arc::new(Mutex::new(PipelineState::Capturing));

        let task = tokio::spawn(run_pipeline(
            backend,
            frames,
            config,
            event_tx,
            paused_rx,
            stop_rx,
            Arc::clone(&state),
        ));

        Ok((
            Self {
                state,
                paused_tx,
                stop_tx,
                task: Some(task),
            },
            event_rx,
        ))
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap()
    }

    /// Stop chunk emission without releasing the backend.
    /// No-op unless currently capturing.
    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == PipelineState::Capturing {
            *state = PipelineState::Paused;
            let _ = self.paused_tx.send(true);
            info!("Capture pipeline paused");
        }
    }

    /// Resume chunk emission. No-op unless currently paused.
    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == PipelineState::Paused {
            *state = PipelineState::Capturing;
            let _ = self.paused_tx.send(false);
            info!("Capture pipeline resumed");
        }
    }

    /// Release the backend, flush buffered audio as a final chunk and
    /// emit the terminal `Stopped` event.
    pub async fn stop(&mut self) {
        {
            let mut state = self.state.lock().unwrap();
            if matches!(*state, PipelineState::Stopped | PipelineState::Failed) {
                return;
            }
            *state = PipelineState::Stopping;
        }

        let _ = self.stop_tx.send(true);

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("Capture pipeline task panicked: {}", e);
            }
        }
    }
}

async fn run_pipeline(
    mut backend: Box<dyn AudioBackend>,
    mut frames: mpsc::Receiver<AudioFrame>,
    config: PipelineConfig,
    events: mpsc::Sender<CaptureEvent>,
    paused_rx: watch::Receiver<bool>,
    mut stop_rx: watch::Receiver<bool>,
    state: Arc<Mutex<PipelineState>>,
) {
    let mut buffer: Buffer = Buffer::new(&config);

    loop {
        tokio::select! {
            biased;

            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    // Drain frames that arrived before the stop request so
                    // nothing captured pre-stop is lost.
                    while let Ok(frame) = frames.try_recv() {
                        if !*paused_rx.borrow() {
                            if !buffer.ingest(frame, &events).await {
                                fail(&state, &events, "chunk encoding failed").await;
                                return;
                            }
                        }
                    }
                    break;
                }
            }

            frame = frames.recv() => {
                match frame {
                    Some(frame) => {
                        // Paused: hardware stays live, emission is gated and
                        // paused-time audio is discarded.
                        if *paused_rx.borrow() {
                            continue;
                        }
                        if !buffer.ingest(frame, &events).await {
                            fail(&state, &events, "chunk encoding failed").await;
                            return;
                        }
                    }
                    None => {
                        warn!("Audio backend stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Final flush of buffered-but-unemitted audio
    if !buffer.flush(&events).await {
        fail(&state, &events, "final chunk encoding failed").await;
        return;
    }

    if let Err(e) = backend.stop().await {
        error!("Failed to stop audio backend: {}", e);
    }

    *state.lock().unwrap() = PipelineState::Stopped;
    let _ = events.send(CaptureEvent::Stopped).await;
    info!("Capture pipeline stopped");
}

async fn fail(
    state: &Arc<Mutex<PipelineState>>,
    events: &mpsc::Sender<CaptureEvent>,
    reason: &str,
) {
    *state.lock().unwrap() = PipelineState::Failed;
    let _ = events
        .send(CaptureEvent::Failed {
            reason: reason.to_string(),
        })
        .await;
}

/// Accumulates frames until one chunk's worth of audio time has passed.
struct Buffer {
    samples: Vec<i16>,
    spec: Option<(u32, u16)>,
    chunk_duration: Duration,
    sound_threshold: i16,
}

impl Buffer {
    fn new(config: &PipelineConfig) -> Self {
        Self {
            samples: Vec::new(),
            spec: None,
            chunk_duration: config.chunk_duration,
            sound_threshold: config.sound_threshold,
        }
    }

    fn samples_per_chunk(&self) -> usize {
        match self.spec {
            Some((rate, channels)) => {
                (rate as u64 * channels as u64 * self.chunk_duration.as_secs()).max(1) as usize
            }
            None => usize::MAX,
        }
    }

    /// Returns false when a chunk failed to encode or the event receiver
    /// went away.
    async fn ingest(&mut self, frame: AudioFrame, events: &mpsc::Sender<CaptureEvent>) -> bool {
        if self.spec.is_none() {
            self.spec = Some((frame.sample_rate, frame.channels));
        }
        self.samples.extend_from_slice(&frame.samples);

        while self.samples.len() >= self.samples_per_chunk() {
            let chunk: Vec<i16> = self.samples.drain(..self.samples_per_chunk()).collect();
            if !self.emit(chunk, events).await {
                return false;
            }
        }

        true
    }

    async fn flush(&mut self, events: &mpsc::Sender<CaptureEvent>) -> bool {
        if self.samples.is_empty() {
            return true;
        }
        let chunk: Vec<i16> = std::mem::take(&mut self.samples);
        self.emit(chunk, events).await
    }

    async fn emit(&self, chunk: Vec<i16>, events: &mpsc::Sender<CaptureEvent>) -> bool {
        let (rate, channels) = match self.spec {
            Some(spec) => spec,
            None => return true,
        };

        let sound = sound_detected(&chunk, self.sound_threshold);

        let wav = match encode_wav(&chunk, rate, channels) {
            Ok(wav) => wav,
            Err(e) => {
                error!("Failed to encode chunk: {}", e);
                return false;
            }
        };

        events
            .send(CaptureEvent::Chunk {
                wav,
                sound_detected: sound,
                captured_at: Utc::now(),
            })
            .await
            .is_ok()
    }
}

/// Cheap sound-presence heuristic: peak deviation against a fixed
/// threshold. This is deliberately not voice-activity detection.
fn sound_detected(samples: &[i16], threshold: i16) -> bool {
    let threshold = threshold.unsigned_abs();
    samples.iter().any(|s| s.unsigned_abs() >= threshold)
}

/// Encode PCM samples as an in-memory WAV blob.
///
/// Encoding happens before any durable-storage or network handoff, so
/// no storage transaction ever waits on it.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        writer.finalize().context("Failed to finalize WAV")?;
    }

    Ok(cursor.into_inner())
}

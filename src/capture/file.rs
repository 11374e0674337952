use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::MicError;
use anyhow::Result;
use hound::WavReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Replays a WAV file as a live audio stream.
///
/// Frames are paced at the configured buffer duration so downstream
/// consumers see the same cadence a live device would produce.
pub struct FileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    capturing: Arc<AtomicBool>,
}

impl FileBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Self {
        Self {
            path,
            config,
            capturing: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait::async_trait]
impl AudioBackend for FileBackend {
    async fn start(&mut self) -> std::result::Result<mpsc::Receiver<AudioFrame>, MicError> {
        let reader = WavReader::open(&self.path).map_err(|e| {
            MicError::DeviceUnavailable(format!("failed to open {}: {}", self.path.display(), e))
        })?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| MicError::DeviceUnavailable(format!("failed to read samples: {}", e)))?;

        info!(
            "File backend opened: {} ({}Hz, {} channels, {} samples)",
            self.path.display(),
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        let (tx, rx) = mpsc::channel(64);
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        let buffer_ms = self.config.buffer_duration_ms.max(1);
        let samples_per_frame =
            (spec.sample_rate as u64 * spec.channels as u64 * buffer_ms / 1000) as usize;

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(buffer_ms));
            let mut timestamp_ms = 0u64;

            for window in samples.chunks(samples_per_frame.max(1)) {
                interval.tick().await;

                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let frame = AudioFrame {
                    samples: window.to_vec(),
                    sample_rate: spec.sample_rate,
                    channels: spec.channels,
                    timestamp_ms,
                };
                timestamp_ms += buffer_ms;

                if tx.send(frame).await.is_err() {
                    warn!("File backend receiver dropped, stopping replay");
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
            info!("File backend replay complete");
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "file"
    }
}

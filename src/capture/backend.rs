use crate::error::MicError;
use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz for downstream STT
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms buffers
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - File: replay a WAV file as a live stream (testing/batch processing)
/// - Scripted: frames pushed programmatically (tests, simulated device)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames.
    /// Acquisition failures surface as `MicError` so callers can branch
    /// to a permission-request flow instead of unwinding.
    async fn start(&mut self) -> std::result::Result<mpsc::Receiver<AudioFrame>, MicError>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone)]
pub enum AudioSource {
    /// Microphone input
    Microphone,
    /// File input (for testing/batch processing)
    File(PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend for the requested source
    pub fn create(
        source: AudioSource,
        config: AudioBackendConfig,
    ) -> std::result::Result<Box<dyn AudioBackend>, MicError> {
        match source {
            AudioSource::Microphone => {
                // No hardware backend is compiled into this build; the
                // capture seam is the AudioBackend trait.
                Err(MicError::DeviceUnavailable(
                    "no microphone backend available on this platform".to_string(),
                ))
            }

            AudioSource::File(path) => {
                let backend = super::file::FileBackend::new(path, config);
                Ok(Box::new(backend))
            }
        }
    }
}

use crate::config::CaptureConfig;
use std::time::Duration;

/// Configuration for the session lifecycle controller
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Audio-time length of each emitted chunk (valid: 1-10 seconds)
    pub chunk_duration: Duration,

    /// Peak-amplitude threshold for the sound-presence heuristic
    pub sound_threshold: i16,

    /// Capture-locale hint applied when the caller supplies none
    pub default_language: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            chunk_duration: Duration::from_secs(5),
            sound_threshold: 500,
            default_language: "auto".to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn from_capture(capture: &CaptureConfig) -> Self {
        Self {
            chunk_duration: Duration::from_secs(capture.chunk_secs.clamp(1, 10)),
            sound_threshold: capture.sound_threshold,
            ..Self::default()
        }
    }
}

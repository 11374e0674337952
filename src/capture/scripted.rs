use super::backend::{AudioBackend, AudioFrame};
use crate::error::MicError;
use anyhow::Result;
use tokio::sync::mpsc;

/// Backend fed by an external sender.
///
/// Used by tests and the simulated-device path: the caller keeps the
/// `mpsc::Sender` and pushes frames whenever it likes. Dropping the
/// sender ends the stream, mirroring a device running dry.
pub struct ScriptedBackend {
    rx: Option<mpsc::Receiver<AudioFrame>>,
    capturing: bool,
}

impl ScriptedBackend {
    /// Create a backend plus the sender that drives it.
    pub fn channel(capacity: usize) -> (mpsc::Sender<AudioFrame>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                rx: Some(rx),
                capturing: false,
            },
        )
    }
}

#[async_trait::async_trait]
impl AudioBackend for ScriptedBackend {
    async fn start(&mut self) -> std::result::Result<mpsc::Receiver<AudioFrame>, MicError> {
        let rx = self.rx.take().ok_or_else(|| {
            MicError::DeviceUnavailable("scripted backend already started".to_string())
        })?;
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing = false;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

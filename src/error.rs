use thiserror::Error;

/// Microphone / capture-device acquisition errors.
///
/// These are reported to the caller so a UI can branch to a
/// permission-request flow; they are never retried automatically.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MicError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no capture device available: {0}")]
    DeviceUnavailable(String),
}

/// Error taxonomy for the capture/sync core.
///
/// Only `Mic` and `SequenceViolation` propagate out of the session
/// controller's public API. `StorageUnavailable` degrades durability and
/// `RemoteUnreachable` is recovered through the local queue.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Mic(#[from] MicError),

    #[error("local queue unavailable: {0}")]
    StorageUnavailable(String),

    #[error("remote unreachable: {0}")]
    RemoteUnreachable(String),

    #[error("chunk sequence violation: {0}")]
    SequenceViolation(String),
}

pub type Result<T> = std::result::Result<T, CaptureError>;

pub mod backend;
pub mod file;
pub mod pipeline;
pub mod scripted;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use file::FileBackend;
pub use pipeline::{CaptureEvent, CapturePipeline, PipelineConfig, PipelineState};
pub use scripted::ScriptedBackend;

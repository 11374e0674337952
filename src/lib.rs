pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod record;
pub mod sequence;
pub mod session;
pub mod store;
pub mod sync;

pub use capture::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, CaptureEvent,
    CapturePipeline, PipelineConfig, PipelineState, ScriptedBackend,
};
pub use config::Config;
pub use error::{CaptureError, MicError};
pub use http::{create_router, AppState};
pub use record::{NewRecord, RecordUpdate, SessionRecord};
pub use sequence::{ChunkSequencer, SessionMode};
pub use session::{
    ControllerConfig, ControllerStatus, SessionController, SessionStats, StartMode, StartOptions,
};
pub use store::{chunk_key, LocalQueue, QueueItem, QueueOp, StoredChunk};
pub use sync::{
    blob_path, BlobStore, Connectivity, HttpBlobStore, HttpRecordService, RecordService,
    SyncEngine, SyncOutcome,
};

//! Sync engine and remote collaborators
//!
//! Translates sequenced chunks and session metadata into remote calls,
//! falling back to the local durable queue when the device is offline or
//! a collaborator is unreachable, and drains that queue when
//! connectivity returns.

mod engine;
mod http;
mod remote;

pub use engine::{SyncEngine, SyncOutcome};
pub use http::{HttpBlobStore, HttpRecordService};
pub use remote::{blob_path, BlobStore, Connectivity, RecordService};

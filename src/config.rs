use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
    pub remote: RemoteConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Audio-time length of each emitted chunk, in seconds (valid: 1-10)
    pub chunk_secs: u64,
    /// Peak-amplitude threshold for the sound-presence heuristic
    pub sound_threshold: i16,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// Root directory for the local durable queue.
    /// Defaults to ~/.scribe-capture/queue when unset.
    pub queue_dir: Option<String>,
}

impl StorageConfig {
    pub fn queue_path(&self) -> PathBuf {
        match &self.queue_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".scribe-capture")
                .join("queue"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the transcript record service
    pub record_url: String,
    /// Base URL of the blob storage service
    pub blob_url: String,
    /// Bearer token for the authenticated principal
    pub token: String,
    /// Principal ID used to namespace blob upload paths
    pub principal_id: String,
    /// Bound on any single remote call before the chunk is queued locally
    pub timeout_secs: u64,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

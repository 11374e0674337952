use super::remote::{BlobStore, RecordService};
use crate::config::RemoteConfig;
use crate::error::{CaptureError, Result};
use crate::record::{NewRecord, RecordUpdate, SessionRecord};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// REST client for the transcript record service.
pub struct HttpRecordService {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpRecordService {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.record_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| CaptureError::RemoteUnreachable(format!("bad response body: {}", e)))
    }
}

fn status_error(status: StatusCode) -> CaptureError {
    CaptureError::RemoteUnreachable(format!("record service returned {}", status))
}

fn transport(e: reqwest::Error) -> CaptureError {
    CaptureError::RemoteUnreachable(e.to_string())
}

#[async_trait::async_trait]
impl RecordService for HttpRecordService {
    async fn create_record(&self, record: NewRecord) -> Result<SessionRecord> {
        debug!("Creating record {}", record.session_id);
        let response = self
            .client
            .post(format!("{}/records", self.base_url))
            .bearer_auth(&self.token)
            .json(&record)
            .send()
            .await
            .map_err(transport)?;
        Self::parse(response).await
    }

    async fn update_record(&self, update: RecordUpdate) -> Result<SessionRecord> {
        debug!("Updating record {}", update.session_id);
        let response = self
            .client
            .patch(format!("{}/records/{}", self.base_url, update.session_id))
            .bearer_auth(&self.token)
            .json(&update)
            .send()
            .await
            .map_err(transport)?;
        Self::parse(response).await
    }

    async fn list_records(&self) -> Result<Vec<SessionRecord>> {
        let response = self
            .client
            .get(format!("{}/records", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        Self::parse(response).await
    }
}

/// REST client for the blob storage service. Uploads are upserts keyed
/// by path; the service provisions its own container and answers with a
/// storage error when it cannot, which we surface as unreachable.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpBlobStore {
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.blob_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }
}

#[async_trait::async_trait]
impl BlobStore for HttpBlobStore {
    async fn put_blob(&self, path: &str, payload: Vec<u8>) -> Result<()> {
        debug!("Uploading blob {} ({} bytes)", path, payload.len());
        let response = self
            .client
            .put(format!("{}/{}?upsert=true", self.base_url, path))
            .bearer_auth(&self.token)
            .header("content-type", "audio/wav")
            .body(payload)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CaptureError::RemoteUnreachable(format!(
                "blob store returned {}",
                status
            )));
        }
        Ok(())
    }
}

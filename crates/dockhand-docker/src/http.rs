use std::time::Duration;

use async_trait::async_trait;
use dockhand_core::runtime::{ContainerRuntime, RuntimeError, RuntimeUnit};
use reqwest::StatusCode;
use tracing::debug;

use crate::error::{DockerError, Result};
use crate::types::{ApiContainer, ApiError};

/// Covers the engine's own stop grace period.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Docker Engine API client over TCP.
#[derive(Debug, Clone)]
pub struct DockerHttp {
    client: reqwest::Client,
    endpoint: String,
}

impl DockerHttp {
    pub fn new(endpoint: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn containers(&self) -> Result<Vec<RuntimeUnit>> {
        let url = format!("{}/containers/json", self.endpoint);
        let resp = self
            .client
            .get(&url)
            .query(&[("all", "true")])
            .send()
            .await?;
        let resp = check(resp).await?;
        let containers: Vec<ApiContainer> = resp.json().await?;
        Ok(containers.into_iter().map(RuntimeUnit::from).collect())
    }

    async fn lifecycle(&self, op: &'static str, id: &str) -> Result<()> {
        let url = format!("{}/containers/{id}/{op}", self.endpoint);
        debug!(%url, "engine API call");
        let resp = self.client.post(&url).send().await?;
        // 304: already in the requested state.
        if resp.status() == StatusCode::NOT_MODIFIED {
            return Ok(());
        }
        check(resp).await.map(drop)
    }
}

/// Turn a non-success response into `DockerError::Status`, using the
/// engine's `{"message": ...}` body when present.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
        .map(|e| e.message)
        .unwrap_or(body);
    Err(DockerError::Status {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl ContainerRuntime for DockerHttp {
    async fn list_units(&self) -> std::result::Result<Vec<RuntimeUnit>, RuntimeError> {
        self.containers().await.map_err(DockerError::unavailable)
    }

    async fn start(&self, id: &str) -> std::result::Result<(), RuntimeError> {
        self.lifecycle("start", id)
            .await
            .map_err(|e| e.rejected("start", id))
    }

    async fn stop(&self, id: &str) -> std::result::Result<(), RuntimeError> {
        self.lifecycle("stop", id)
            .await
            .map_err(|e| e.rejected("stop", id))
    }

    async fn restart(&self, id: &str) -> std::result::Result<(), RuntimeError> {
        self.lifecycle("restart", id)
            .await
            .map_err(|e| e.rejected("restart", id))
    }
}

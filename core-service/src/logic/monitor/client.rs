//! Analysis Service Client

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::logic::wire::{AnalyzeRequest, AnalyzeResponse};

pub const ANALYZE_PATH: &str = "/api/v1/analyze";
pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Error)]
pub enum ClientError {
    /// Network failure, timeout or a restarting service; the next poll retries
    #[error("transient: {0}")]
    Transient(String),
    /// The service refused the request
    #[error("rejected with status {0}: {1}")]
    Rejected(u16, String),
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }
}

#[async_trait]
pub trait AnalysisService: Send + Sync {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ClientError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub ready: bool,
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

pub struct HttpAnalysisClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAnalysisClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transient(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, HEALTH_PATH))
            .send()
            .await
            .map_err(classify)?;

        // 503 still carries a body describing why the service is not ready
        response.json::<HealthStatus>().await.map_err(|e| ClientError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ClientError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, ANALYZE_PATH))
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ClientError::Transient(format!("service returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Rejected(status.as_u16(), body));
        }

        response
            .json::<AnalyzeResponse>()
            .await
            .map_err(|e| if e.is_timeout() { classify(e) } else { ClientError::Decode(e.to_string()) })
    }
}

fn classify(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Transient(format!("timed out: {}", e))
    } else if e.is_decode() {
        ClientError::Decode(e.to_string())
    } else {
        ClientError::Transient(e.to_string())
    }
}

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use vision::{AnalysisRequest, AnalysisResponse};

/// Anything that can answer an analysis request.
#[async_trait]
pub trait AnalyzeApi: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse>;
}

/// Calls a running service's `/analyze` endpoint over HTTP.
#[derive(Clone)]
pub struct HttpAnalyzeClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAnalyzeClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl AnalyzeApi for HttpAnalyzeClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisResponse> {
        let url = format!("{}/analyze", self.base_url.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Request to {} failed", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API status {}: {}", status.as_u16(), body.trim());
        }

        response
            .json()
            .await
            .context("Failed to parse analyze response")
    }
}

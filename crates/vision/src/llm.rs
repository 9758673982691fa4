use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ModelError;
use crate::prompt::ComposedPayload;

/// Hosted multimodal model returning raw reply text.
#[async_trait]
pub trait MultimodalModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, payload: &ComposedPayload) -> Result<String, ModelError>;
}

/// Sampling settings sent with every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.95,
            top_k: 32,
            max_output_tokens: 8192,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VertexConfig {
    pub project: String,
    pub location: String,
    pub model: String,
    /// Overrides the regional endpoint, e.g. for a proxy or a test server.
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    pub timeout: Duration,
    pub generation: GenerationSettings,
}

/// Gemini on Vertex AI via the `generateContent` REST method.
#[derive(Clone)]
pub struct VertexClient {
    endpoint: String,
    model: String,
    access_token: Option<String>,
    generation: GenerationSettings,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: WireGenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
enum Part<'a> {
    FileData(FileData<'a>),
    Text(&'a str),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    file_uri: &'a str,
    mime_type: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ReplyPart>,
}

#[derive(Deserialize)]
struct ReplyPart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u64>,
}

impl VertexClient {
    pub fn new(config: VertexConfig) -> Self {
        let base_url = config.base_url.unwrap_or_else(|| match config.location.as_str() {
            "global" => "https://aiplatform.googleapis.com".to_string(),
            location => format!("https://{}-aiplatform.googleapis.com", location),
        });
        let endpoint = format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
            base_url.trim_end_matches('/'),
            config.project,
            config.location,
            config.model
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();

        Self {
            endpoint,
            model: config.model,
            access_token: config.access_token.filter(|t| !t.is_empty()),
            generation: config.generation,
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn build_request<'a>(&self, payload: &'a ComposedPayload) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::FileData(FileData {
                        file_uri: &payload.image.uri,
                        mime_type: &payload.image.mime_type,
                    }),
                    Part::Text(&payload.text),
                ],
            }],
            generation_config: WireGenerationConfig {
                temperature: self.generation.temperature,
                top_p: self.generation.top_p,
                top_k: self.generation.top_k,
                max_output_tokens: self.generation.max_output_tokens,
                response_mime_type: "application/json",
            },
        }
    }
}

#[async_trait]
impl MultimodalModel for VertexClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, payload: &ComposedPayload) -> Result<String, ModelError> {
        tracing::debug!(model = %self.model, image = %payload.image.uri, "Querying model");

        let mut request = self.client.post(&self.endpoint).json(&self.build_request(payload));
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("{} returned {}: {}", self.model, status, body.trim());
            let transient = status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::REQUEST_TIMEOUT
                || status.is_server_error();
            return Err(if transient {
                ModelError::transient(message)
            } else {
                ModelError::permanent(message)
            });
        }

        let reply: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelError::invalid_reply(format!("unreadable response body: {}", e)))?;

        if let Some(tokens) = reply.usage_metadata.as_ref().and_then(|u| u.total_token_count) {
            tracing::debug!(model = %self.model, tokens, "Model usage");
        }

        let candidate = reply
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::invalid_reply("no candidates returned"))?;

        match candidate.finish_reason.as_deref() {
            None | Some("STOP") => {}
            Some(reason) => {
                return Err(ModelError::invalid_reply(format!(
                    "generation stopped prematurely: {}",
                    reason
                )));
            }
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ModelError::invalid_reply("empty text response"));
        }

        Ok(text)
    }
}

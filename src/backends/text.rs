//! Text generation backend: a text-generation-webui style completion API.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SamplingParams;
use crate::error::LlmError;

const PROVIDER: &str = "text-generation";

/// Produces a completion for a fully rendered prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Request body for `POST {server}/api/v1/generate`.
#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub prompt: &'a str,
    #[serde(flatten)]
    pub params: &'a SamplingParams,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    results: Vec<GenerateResult>,
}

#[derive(Debug, Deserialize)]
struct GenerateResult {
    text: Option<String>,
}

/// Endpoint URL for a server base URL, tolerating a trailing slash.
pub fn generate_url(server: &str) -> String {
    format!("{}/api/v1/generate", server.trim_end_matches('/'))
}

/// Extract the first candidate's text from a response body.
pub fn parse_generate_response(body: &str) -> Result<String, LlmError> {
    let response: GenerateResponse = serde_json::from_str(body)?;
    let first = response
        .results
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::EmptyResponse {
            provider: PROVIDER.into(),
        })?;
    first.text.ok_or_else(|| LlmError::InvalidResponse {
        provider: PROVIDER.into(),
        reason: "result has no text".into(),
    })
}

/// HTTP client for the text generation server.
pub struct TextGenerationClient {
    client: reqwest::Client,
    url: String,
    params: SamplingParams,
}

impl TextGenerationClient {
    pub fn new(server: &str, params: SamplingParams) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: generate_url(server),
            params,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TextGenerator for TextGenerationClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let body = GenerateRequest {
            prompt,
            params: &self.params,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let text = resp.text().await.map_err(|e| LlmError::RequestFailed {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(LlmError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        let reply = parse_generate_response(&text)?;
        debug!(reply = %reply, "Text generation reply");
        Ok(reply)
    }
}

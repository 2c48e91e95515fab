//! Image generation backend: a Stable Diffusion web UI `txt2img` API.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::BotConfig;
use crate::error::ImageError;
use crate::parsing::ImageRequest;

const PROVIDER: &str = "stable-diffusion";

/// Renders an image from a prompt pair, returning encoded image bytes.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, negative_prompt: &str) -> Result<Vec<u8>, ImageError>;
}

/// Positive and negative prompt for one image request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePrompts {
    pub prompt: String,
    pub negative: String,
}

/// Build the prompts for an image request.
///
/// Selfies are anchored on the configured self-description and carry the
/// configured negative prompt. Photos use the requested subject alone.
pub fn image_prompts(config: &BotConfig, request: ImageRequest<'_>) -> ImagePrompts {
    match request {
        ImageRequest::Selfie { detail: None } => ImagePrompts {
            prompt: config.selfie_prompt.clone(),
            negative: config.image_negative_prompt.clone(),
        },
        ImageRequest::Selfie {
            detail: Some(detail),
        } => ImagePrompts {
            prompt: format!("{}, {detail}", config.selfie_prompt),
            negative: config.image_negative_prompt.clone(),
        },
        ImageRequest::Photo { detail } => ImagePrompts {
            prompt: detail.to_string(),
            negative: String::new(),
        },
    }
}

#[derive(Debug, Serialize)]
struct Txt2ImgRequest<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Endpoint URL for a server base URL, tolerating a trailing slash.
pub fn txt2img_url(server: &str) -> String {
    format!("{}/sdapi/v1/txt2img", server.trim_end_matches('/'))
}

/// Decode the first image of a `txt2img` response body.
///
/// Images may arrive as data URIs; anything up to the first comma is dropped.
pub fn decode_txt2img_response(body: &str) -> Result<Vec<u8>, ImageError> {
    let response: Txt2ImgResponse =
        serde_json::from_str(body).map_err(|e| ImageError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;
    let encoded = response
        .images
        .first()
        .ok_or_else(|| ImageError::InvalidResponse {
            provider: PROVIDER.into(),
            reason: "no images returned".into(),
        })?;
    let payload = encoded
        .split_once(',')
        .map_or(encoded.as_str(), |(_, data)| data);
    Ok(STANDARD.decode(payload.trim())?)
}

/// HTTP client for the Stable Diffusion server.
pub struct StableDiffusionClient {
    client: reqwest::Client,
    url: String,
}

impl StableDiffusionClient {
    pub fn new(server: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: txt2img_url(server),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ImageGenerator for StableDiffusionClient {
    async fn generate(&self, prompt: &str, negative_prompt: &str) -> Result<Vec<u8>, ImageError> {
        debug!(prompt = %prompt, negative_prompt = %negative_prompt, "Requesting image");

        let resp = self
            .client
            .post(&self.url)
            .json(&Txt2ImgRequest {
                prompt,
                negative_prompt,
            })
            .send()
            .await
            .map_err(|e| ImageError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| ImageError::RequestFailed {
            provider: PROVIDER.into(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(ImageError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("HTTP {status}"),
            });
        }

        let image = decode_txt2img_response(&body)?;
        info!(bytes = image.len(), "Image generated");
        Ok(image)
    }
}

//! Gemini REST client (`models/{model}:generateContent`)

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{GenerativeBackend, Generated, ImagePayload, Modality};
use crate::config::GeminiConfig;
use crate::error::{AdvisorError, Result};

/// Sampling settings per call kind
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<&'static str>>,
}

impl GenerationConfig {
    fn for_mode(mode: Modality) -> Self {
        match mode {
            // Low temperature for analytical answers
            Modality::Text => Self {
                temperature: 0.2,
                top_p: 0.8,
                top_k: 40,
                max_output_tokens: Some(2048),
                response_modalities: None,
            },
            Modality::Image => Self {
                temperature: 0.7,
                top_p: 1.0,
                top_k: 32,
                max_output_tokens: None,
                response_modalities: Some(vec!["Text", "Image"]),
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, alias = "inline_data", skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Deserialize, Default)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// Gemini generative model client
#[derive(Debug)]
pub struct GeminiClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    analysis_model: String,
    image_model: String,
}

impl GeminiClient {
    /// Create a client from configuration
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AdvisorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            analysis_model: config.analysis_model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    /// Check if API key is configured
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn model_for(&self, mode: Modality) -> &str {
        match mode {
            Modality::Text => &self.analysis_model,
            Modality::Image => &self.image_model,
        }
    }

    fn build_request(images: &[ImagePayload], prompt: &str, mode: Modality) -> GenerateRequest {
        let mut parts: Vec<Part> = images
            .iter()
            .map(|image| Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: BASE64.encode(&image.data),
                }),
            })
            .collect();
        parts.push(Part {
            text: Some(prompt.to_string()),
            inline_data: None,
        });

        GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig::for_mode(mode),
        }
    }
}

/// Collect text and inline images from the first candidate
fn into_generated(response: GenerateResponse) -> Generated {
    let parts = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let mut text: Option<String> = None;
    let mut images = Vec::new();

    for part in parts {
        if let Some(t) = part.text {
            text.get_or_insert_with(String::new).push_str(&t);
        }
        if let Some(inline) = part.inline_data {
            match BASE64.decode(inline.data.as_bytes()) {
                Ok(data) => images.push(ImagePayload {
                    mime_type: inline.mime_type,
                    data,
                }),
                Err(e) => warn!("Skipping undecodable inline image: {}", e),
            }
        }
    }

    Generated { text, images }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate(
        &self,
        images: &[ImagePayload],
        prompt: &str,
        mode: Modality,
    ) -> Result<Generated> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AdvisorError::Transport("Gemini API key not configured".to_string()))?;

        let model = self.model_for(mode);
        let request = Self::build_request(images, prompt, mode);

        debug!("Sending {:?} request to Gemini model {}", mode, model);

        let response = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AdvisorError::Transport(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Gemini API error: {} - {}", status, body);
            let excerpt: String = body.chars().take(200).collect();
            return Err(AdvisorError::Transport(format!(
                "API error: {} {}",
                status, excerpt
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AdvisorError::Transport(format!("Failed to parse response: {}", e)))?;

        let generated = into_generated(body);
        debug!(
            "Gemini returned {} text chars and {} images",
            generated.text.as_ref().map_or(0, String::len),
            generated.images.len()
        );
        Ok(generated)
    }
}

//! HTTP client for a running advisord server

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::debug;

use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::error::{AdvisorError, Result};
use crate::images::{validate_upload, ImageRef};
use crate::protocol::{AnalyzeResponse, ErrorResponse};

/// Client for the analyze endpoint
#[derive(Debug, Clone)]
pub struct AdvisorClient {
    client: Client,
    base_url: String,
}

impl AdvisorClient {
    /// `timeout` bounds the whole request, which covers every model call
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload a photo file for analysis
    pub async fn analyze_file(&self, path: &Path, incremental: bool) -> Result<AnalyzeResponse> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        self.analyze(data, &file_name, incremental).await
    }

    /// Upload image bytes for analysis
    ///
    /// Type and size are checked locally first, so a bad upload never
    /// reaches the network.
    pub async fn analyze(
        &self,
        data: Vec<u8>,
        file_name: &str,
        incremental: bool,
    ) -> Result<AnalyzeResponse> {
        let kind = validate_upload(data.len(), None, Some(file_name), DEFAULT_MAX_UPLOAD_BYTES)?;

        let part = Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(kind.mime())?;
        let form = Form::new().part("image", part);

        let url = format!(
            "{}/api/analyze-urban-space?incremental={}",
            self.base_url, incremental
        );
        debug!("POST {}", url);
        let response = self.client.post(&url).multipart(form).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<AnalyzeResponse>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => match err.details {
                Some(details) => format!("{}: {}", err.error, details),
                None => err.error,
            },
            Err(_) => format!("server returned {}", status),
        };

        Err(match status.as_u16() {
            400 => AdvisorError::Validation(message),
            429 => AdvisorError::RateLimited,
            _ => AdvisorError::Transport(message),
        })
    }

    /// Absolute URL of a result image
    pub fn image_url(&self, image: &ImageRef) -> String {
        format!("{}{}", self.base_url, image.url())
    }

    /// Download a result image
    pub async fn fetch_image(&self, image: &ImageRef) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.image_url(image))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

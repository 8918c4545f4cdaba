//! Generative model backends
//!
//! The model is an opaque remote function: images plus a prompt in, text
//! and/or images out. A response without an image is a valid answer, not an
//! error.

mod gemini;
mod scripted;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::{self, prompts, Analysis};
use crate::error::Result;

pub use gemini::GeminiClient;
pub use scripted::{RecordedCall, ScriptedBackend};

/// What the call should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

/// Image bytes with their MIME type
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Model output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    pub text: Option<String>,
    pub images: Vec<ImagePayload>,
}

impl Generated {
    /// When several images come back, the first one wins
    pub fn first_image(&self) -> Option<&ImagePayload> {
        self.images.first()
    }

    pub fn into_first_image(self) -> Option<ImagePayload> {
        self.images.into_iter().next()
    }
}

/// A hosted generative model
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// One blocking call; no partial results
    async fn generate(
        &self,
        images: &[ImagePayload],
        prompt: &str,
        mode: Modality,
    ) -> Result<Generated>;
}

/// Run the analysis call on an uploaded image and parse the answer
///
/// Only transport failures are errors; unusable text degrades to the
/// fallback analysis.
pub async fn analyze_image(
    backend: &dyn GenerativeBackend,
    image: &ImagePayload,
) -> Result<Analysis> {
    info!("Analyzing urban space image ({} bytes)", image.data.len());

    let prompt = prompts::build_analysis_prompt();
    let generated = backend
        .generate(std::slice::from_ref(image), &prompt, Modality::Text)
        .await?;

    let analysis = analysis::parse(generated.text.as_deref().unwrap_or_default());
    info!(
        "Analysis complete: {} issues, {} recommendations{}",
        analysis.identified_issues.len(),
        analysis.recommendations.len(),
        if analysis.is_degraded() { " (degraded)" } else { "" }
    );
    Ok(analysis)
}

//! Visualization pipeline
//!
//! Incremental mode applies one recommendation per model call, feeding each
//! generated image back in as the input of the next call. Steps are strictly
//! sequential: step `i + 1` needs the image produced by step `i`.
//!
//! A step whose call returns no image is skipped, not retried. If no step
//! produces an image the pipeline falls back to a single-shot visualization,
//! which is the only path that fails the request for lack of an image.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::analysis::prompts::{build_full_visualization_prompt, build_incremental_prompt};
use crate::analysis::{Analysis, Category, Recommendation};
use crate::backend::{GenerativeBackend, Generated, ImagePayload, Modality};
use crate::error::{AdvisorError, Result};
use crate::images::{ImageRef, ResultStore, SessionStamp};

/// One generated improvement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationStep {
    /// Position in the produced step sequence
    pub index: usize,
    /// Position of the triggering recommendation in the analysis
    pub recommendation_index: usize,
    pub category: Category,
    pub description: String,
    pub benefits: String,
    #[serde(rename = "imageUrl")]
    pub image: ImageRef,
}

impl GenerationStep {
    fn from_recommendation(
        index: usize,
        recommendation_index: usize,
        rec: &Recommendation,
        image: ImageRef,
    ) -> Self {
        Self {
            index,
            recommendation_index,
            category: rec.category,
            description: rec.recommendation.clone(),
            benefits: rec.expected_benefits.clone(),
            image,
        }
    }
}

/// Which code path produced the outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Incremental,
    SingleShot,
}

/// Result of a visualization run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub stamp: SessionStamp,
    pub final_image: ImageRef,
    pub steps: Vec<GenerationStep>,
    pub mode: RunMode,
}

/// Accumulator of the incremental fold: the image to edit next and the steps so far
#[derive(Debug, Clone)]
pub struct Chain {
    current: ImagePayload,
    steps: Vec<GenerationStep>,
}

impl Chain {
    pub fn new(original: ImagePayload) -> Self {
        Self {
            current: original,
            steps: Vec::new(),
        }
    }

    /// Fold one recommendation's outcome into the chain
    ///
    /// With an image, a step is appended and the image becomes the next
    /// input. Without one, the chain is unchanged.
    pub fn record(
        mut self,
        recommendation_index: usize,
        rec: &Recommendation,
        produced: Option<(ImagePayload, ImageRef)>,
    ) -> Self {
        if let Some((image, image_ref)) = produced {
            let index = self.steps.len();
            self.steps.push(GenerationStep::from_recommendation(
                index,
                recommendation_index,
                rec,
                image_ref,
            ));
            self.current = image;
        }
        self
    }

    pub fn current_image(&self) -> &ImagePayload {
        &self.current
    }

    pub fn steps(&self) -> &[GenerationStep] {
        &self.steps
    }

    pub fn last_image(&self) -> Option<&ImageRef> {
        self.steps.last().map(|s| &s.image)
    }

    pub fn into_steps(self) -> Vec<GenerationStep> {
        self.steps
    }
}

/// Drives model calls and result persistence for one request at a time
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn GenerativeBackend>,
    store: ResultStore,
    cancel: Option<watch::Receiver<bool>>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn GenerativeBackend>, store: ResultStore) -> Self {
        Self {
            backend,
            store,
            cancel: None,
        }
    }

    /// Stop awaiting model calls once `cancel` flips to true
    ///
    /// The in-flight result is discarded; files already written stay.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Incremental when requested and there is something to apply, single-shot otherwise
    pub async fn visualize(
        &self,
        image: &ImagePayload,
        analysis: &Analysis,
        incremental: bool,
    ) -> Result<GenerationOutcome> {
        if incremental && !analysis.recommendations.is_empty() {
            self.run_incremental(image, analysis).await
        } else {
            self.run_single_shot(image, analysis).await
        }
    }

    /// One call per recommendation, chaining each output into the next input
    pub async fn run_incremental(
        &self,
        image: &ImagePayload,
        analysis: &Analysis,
    ) -> Result<GenerationOutcome> {
        let stamp = SessionStamp::now();
        let total = analysis.recommendations.len();
        let mut chain = Chain::new(image.clone());
        let mut final_image = None;

        info!("Generating {} incremental improvements (session {})", total, stamp);

        for (i, rec) in analysis.recommendations.iter().enumerate() {
            let prompt = build_incremental_prompt(rec, i + 1, total);
            info!("Generating improvement {}/{}: {}", i + 1, total, rec.category);

            let generated = self
                .call(
                    std::slice::from_ref(chain.current_image()),
                    &prompt,
                    Modality::Image,
                )
                .await?;

            let produced = match generated.into_first_image() {
                Some(output) => {
                    let image_ref = self.store.save(&output, stamp, Some(i + 1)).await?;
                    if i + 1 == total {
                        final_image = Some(self.store.copy_as_final(&image_ref, stamp).await?);
                    }
                    debug!("Improvement {} saved as {}", i + 1, image_ref.file_name());
                    Some((output, image_ref))
                }
                None => {
                    warn!(
                        "No image was generated for incremental improvement {}, skipping",
                        i + 1
                    );
                    None
                }
            };
            chain = chain.record(i, rec, produced);
        }

        // Last recommendation skipped: the last produced step is the final image
        let Some(final_image) = final_image.or_else(|| chain.last_image().cloned()) else {
            info!("No incremental images generated, falling back to single-shot visualization");
            return self.single_shot(image, analysis, stamp).await;
        };

        Ok(GenerationOutcome {
            stamp,
            final_image,
            steps: chain.into_steps(),
            mode: RunMode::Incremental,
        })
    }

    /// One call applying every recommendation to the original image
    pub async fn run_single_shot(
        &self,
        image: &ImagePayload,
        analysis: &Analysis,
    ) -> Result<GenerationOutcome> {
        self.single_shot(image, analysis, SessionStamp::now()).await
    }

    async fn single_shot(
        &self,
        image: &ImagePayload,
        analysis: &Analysis,
        stamp: SessionStamp,
    ) -> Result<GenerationOutcome> {
        info!("Generating full visualization (session {})", stamp);

        let prompt = build_full_visualization_prompt(analysis);
        let generated = self
            .call(std::slice::from_ref(image), &prompt, Modality::Image)
            .await?;

        let output = generated.into_first_image().ok_or_else(|| {
            AdvisorError::GenerationFailure("no image was generated in the response".to_string())
        })?;
        let final_image = self.store.save(&output, stamp, None).await?;
        info!("Improved visualization saved as {}", final_image.file_name());

        let steps = analysis
            .recommendations
            .iter()
            .enumerate()
            .map(|(i, rec)| GenerationStep::from_recommendation(i, i, rec, final_image.clone()))
            .collect();

        Ok(GenerationOutcome {
            stamp,
            final_image,
            steps,
            mode: RunMode::SingleShot,
        })
    }

    async fn call(
        &self,
        images: &[ImagePayload],
        prompt: &str,
        mode: Modality,
    ) -> Result<Generated> {
        let Some(cancel) = &self.cancel else {
            return self.backend.generate(images, prompt, mode).await;
        };

        let mut cancel = cancel.clone();
        if *cancel.borrow() {
            return Err(AdvisorError::Cancelled);
        }

        tokio::select! {
            result = self.backend.generate(images, prompt, mode) => result,
            _ = cancelled(&mut cancel) => {
                warn!("Generation cancelled, discarding in-flight result");
                Err(AdvisorError::Cancelled)
            }
        }
    }
}

/// Resolves once the flag is true; never resolves if the sender is gone
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        if *rx.borrow() {
            return;
        }
    }
}

//! Wire types shared by the server and the `advisor` client

use serde::{Deserialize, Serialize};

use crate::analysis::{Analysis, Category};
use crate::error::AdvisorError;
use crate::images::ImageRef;
use crate::pipeline::{GenerationOutcome, GenerationStep};

/// Successful reply to `POST /api/analyze-urban-space`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub success: bool,
    pub analysis: Analysis,
    /// Final improved image
    pub image_url: ImageRef,
    /// Images to page through; the final image alone when no steps were produced
    pub incremental_images: Vec<ImageRef>,
    pub incremental_changes: Vec<Change>,
    #[serde(default)]
    pub steps: Vec<GenerationStep>,
}

/// Summary of one applied recommendation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub id: usize,
    pub category: Category,
    pub description: String,
    pub benefits: String,
}

impl From<&GenerationStep> for Change {
    fn from(step: &GenerationStep) -> Self {
        Self {
            id: step.recommendation_index,
            category: step.category,
            description: step.description.clone(),
            benefits: step.benefits.clone(),
        }
    }
}

impl AnalyzeResponse {
    pub fn new(analysis: Analysis, outcome: GenerationOutcome) -> Self {
        let mut incremental_images: Vec<ImageRef> =
            outcome.steps.iter().map(|s| s.image.clone()).collect();
        incremental_images.dedup();
        if incremental_images.is_empty() {
            incremental_images.push(outcome.final_image.clone());
        }

        Self {
            success: true,
            analysis,
            image_url: outcome.final_image,
            incremental_images,
            incremental_changes: outcome.steps.iter().map(Change::from).collect(),
            steps: outcome.steps,
        }
    }
}

/// Error body: `{ "error": ..., "details": ... }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&AdvisorError> for ErrorResponse {
    fn from(err: &AdvisorError) -> Self {
        let error = match err {
            AdvisorError::Validation(msg) => msg.clone(),
            AdvisorError::RateLimited => "Too many requests".to_string(),
            _ => "Failed to process urban space image".to_string(),
        };
        let details = match err {
            AdvisorError::Validation(_) | AdvisorError::RateLimited => None,
            other => Some(other.to_string()),
        };
        Self { error, details }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Recommendation;
    use crate::images::SessionStamp;
    use crate::pipeline::RunMode;

    fn analysis() -> Analysis {
        Analysis {
            overall_description: "Plaza".into(),
            identified_issues: vec![],
            recommendations: vec![Recommendation {
                category: Category::Greenery,
                recommendation: "Plant trees".into(),
                expected_benefits: "Shade".into(),
            }],
            principles: vec![],
            raw_text: None,
        }
    }

    fn step(index: usize, rec_index: usize, file: &str) -> GenerationStep {
        GenerationStep {
            index,
            recommendation_index: rec_index,
            category: Category::Greenery,
            description: "Plant trees".into(),
            benefits: "Shade".into(),
            image: ImageRef::from_url(file),
        }
    }

    #[test]
    fn test_response_uses_camel_case_keys() {
        let outcome = GenerationOutcome {
            stamp: SessionStamp::from_millis(9),
            final_image: ImageRef::from_url("improved-9.png"),
            steps: vec![step(0, 2, "improved-9-step-3.png")],
            mode: RunMode::Incremental,
        };
        let json = serde_json::to_value(AnalyzeResponse::new(analysis(), outcome)).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["imageUrl"], "/results/improved-9.png");
        assert_eq!(json["incrementalImages"][0], "/results/improved-9-step-3.png");
        assert_eq!(json["incrementalChanges"][0]["id"], 2);
        assert_eq!(json["incrementalChanges"][0]["category"], "Greenery");
        assert_eq!(json["steps"][0]["imageUrl"], "/results/improved-9-step-3.png");
        assert_eq!(json["steps"][0]["recommendationIndex"], 2);
        assert_eq!(json["analysis"]["overall_description"], "Plaza");
    }

    #[test]
    fn test_single_shot_lists_final_image_once() {
        let outcome = GenerationOutcome {
            stamp: SessionStamp::from_millis(9),
            final_image: ImageRef::from_url("improved-9.png"),
            steps: vec![step(0, 0, "improved-9.png"), step(1, 1, "improved-9.png")],
            mode: RunMode::SingleShot,
        };
        let response = AnalyzeResponse::new(analysis(), outcome);
        assert_eq!(response.incremental_images.len(), 1);
        assert_eq!(response.incremental_changes.len(), 2);
    }

    #[test]
    fn test_error_body() {
        let body = ErrorResponse::from(&AdvisorError::Transport("API error: 503".into()));
        assert_eq!(body.error, "Failed to process urban space image");
        assert_eq!(body.details.as_deref(), Some("model request failed: API error: 503"));

        let body = ErrorResponse::from(&AdvisorError::Validation("No image uploaded".into()));
        assert_eq!(body.error, "No image uploaded");
        assert!(body.details.is_none());
    }
}

//! Client session state
//!
//! Provides:
//! - `Session`, the record of one completed analysis run
//! - `ClientState`, the submit/browse state machine with cursor paging
//! - `History`, the capped local collection of past sessions

mod history;
mod state;

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{Analysis, Category};
use crate::images::{ImageRef, SessionStamp};
use crate::pipeline::GenerationStep;
use crate::protocol::AnalyzeResponse;

pub use history::{History, HISTORY_CAPACITY};
pub use state::{ClientState, Cursor, Phase, TransitionError};

/// One end-to-end run, as kept in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionStamp,
    /// Where the uploaded photo came from (local path or URL)
    pub original_image: String,
    pub final_image: ImageRef,
    pub analysis: Analysis,
    pub steps: Vec<GenerationStep>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Build a session from a server reply
    ///
    /// Replies without `steps` are rebuilt from the paired image and change
    /// lists; when there are fewer images than changes the last image is
    /// reused.
    pub fn from_response(original: &Path, response: AnalyzeResponse) -> Self {
        let AnalyzeResponse {
            analysis,
            image_url,
            incremental_images,
            incremental_changes,
            steps,
            ..
        } = response;

        let steps = if steps.is_empty() {
            incremental_changes
                .into_iter()
                .enumerate()
                .map(|(i, change)| GenerationStep {
                    index: i,
                    recommendation_index: change.id,
                    category: change.category,
                    description: change.description,
                    benefits: change.benefits,
                    image: incremental_images
                        .get(i)
                        .or(incremental_images.last())
                        .cloned()
                        .unwrap_or_else(|| image_url.clone()),
                })
                .collect()
        } else {
            steps
        };

        Self {
            id: SessionStamp::now(),
            original_image: original.display().to_string(),
            final_image: image_url,
            analysis,
            steps,
            created_at: Utc::now(),
        }
    }

    /// Index of the first step in `category`
    pub fn step_for(&self, category: Category) -> Option<usize> {
        self.steps.iter().position(|s| s.category == category)
    }

    /// Image shown at cursor position `index`; the final image when there are no steps
    pub fn image_at(&self, index: usize) -> &ImageRef {
        self.steps
            .get(index)
            .map(|s| &s.image)
            .unwrap_or(&self.final_image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Recommendation;
    use crate::protocol::Change;

    fn response(steps: Vec<GenerationStep>, images: &[&str], changes: usize) -> AnalyzeResponse {
        AnalyzeResponse {
            success: true,
            analysis: Analysis {
                overall_description: "Square".into(),
                identified_issues: vec![],
                recommendations: vec![Recommendation {
                    category: Category::Safety,
                    recommendation: "Lighting".into(),
                    expected_benefits: "Night use".into(),
                }],
                principles: vec![],
                raw_text: None,
            },
            image_url: ImageRef::from_url("/results/improved-1.png"),
            incremental_images: images.iter().map(|s| ImageRef::from_url(s)).collect(),
            incremental_changes: (0..changes)
                .map(|i| Change {
                    id: i,
                    category: if i == 1 { Category::Greenery } else { Category::Safety },
                    description: format!("change {}", i),
                    benefits: "better".into(),
                })
                .collect(),
            steps,
        }
    }

    #[test]
    fn test_from_response_pairs_images_with_changes() {
        let session = Session::from_response(
            Path::new("street.jpg"),
            response(
                vec![],
                &["/results/improved-1-step-1.png", "/results/improved-1-step-2.png"],
                2,
            ),
        );
        assert_eq!(session.steps.len(), 2);
        assert_eq!(
            session.steps[1].image.url(),
            "/results/improved-1-step-2.png"
        );
        assert_eq!(session.step_for(Category::Greenery), Some(1));
        assert_eq!(session.original_image, "street.jpg");
    }

    #[test]
    fn test_from_response_single_image_shared_by_all_changes() {
        let session = Session::from_response(
            Path::new("street.jpg"),
            response(vec![], &["/results/improved-1.png"], 3),
        );
        assert_eq!(session.steps.len(), 3);
        assert!(session.steps.iter().all(|s| s.image == session.final_image));
    }

    #[test]
    fn test_image_at_falls_back_to_final() {
        let session =
            Session::from_response(Path::new("a.png"), response(vec![], &[], 0));
        assert!(session.steps.is_empty());
        assert_eq!(session.image_at(0), &session.final_image);
    }
}

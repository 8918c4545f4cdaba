//! Prompt builders for the analysis and visualization calls
//!
//! Pure functions: output depends only on the arguments.

use super::types::{Analysis, Recommendation};

/// Prompt asking the model for a structured JSON assessment
pub fn build_analysis_prompt() -> String {
    r#"As an expert urban planner, analyze this urban space in detail and identify areas for improvement.

Please respond in the following JSON format structure:
{
  "current_assessment": {
    "overall_description": "Brief description of the urban space",
    "identified_issues": [
      {
        "category": "One of: Walkability, Transportation, Public Space, Greenery, Safety, Accessibility, Infrastructure, or Other",
        "details": "Detailed description of the issue"
      },
      ...
    ]
  },
  "improvement_recommendations": [
    {
      "category": "Same categories as above",
      "recommendation": "Specific improvement recommendation",
      "expected_benefits": "Expected benefits of this change"
    },
    ...
  ],
  "urban_planning_principles": [
    "List of 3-5 key urban planning principles that would improve this space"
  ]
}

Focus on practical improvements that could realistically be implemented and would significantly enhance the livability, sustainability, and functionality of this urban space. Consider walkability, public transportation access, green spaces, community gathering areas, safety features, and accessibility.

Important: Limit the recommendations to 3-5 key improvements that would have the most impact. For each recommendation, be specific and actionable."#
        .to_string()
}

/// Prompt applying exactly one recommendation to the current image
///
/// `step_number` is 1-based.
pub fn build_incremental_prompt(
    recommendation: &Recommendation,
    step_number: usize,
    total_steps: usize,
) -> String {
    format!(
        r#"You are a skilled urban planner and architectural visualizer. I need you to make ONE SPECIFIC CHANGE to this urban space image.

IMPROVEMENT ({step_number} of {total_steps}): {category}
{text}

CRITICAL REQUIREMENTS:
1. Make ONLY this ONE specific change to the image. Do not add any other improvements.
2. Keep the image photorealistic - not a sketch, drawing or cartoon.
3. Maintain the EXACT same perspective, angle, scale, and composition as the original.
4. Preserve all buildings, people, vehicles, and infrastructure EXCEPT for the specific area you are improving.
5. Maintain all lighting conditions, weather, and time of day exactly as in the original.
6. Make the change VISUALLY OBVIOUS - ensure it's clearly visible what has been improved.
7. Avoid adding text, labels, or annotations to the image.

The goal is to show incremental, realistic improvements that could actually be implemented. This will be part of a sequence showing step-by-step enhancements, so it's crucial that ONLY the specified change is made while everything else remains identical to the previous image.

Generate a photorealistic visualization showing ONLY this specific urban improvement implemented in the space."#,
        category = recommendation.category,
        text = recommendation.recommendation,
    )
}

/// Prompt applying every recommendation in one transformation
pub fn build_full_visualization_prompt(analysis: &Analysis) -> String {
    let recommendations = bullet_list(
        analysis
            .recommendations
            .iter()
            .map(|r| r.recommendation.as_str()),
    );
    let principles = bullet_list(analysis.principles.iter().map(String::as_str));

    format!(
        r#"Transform this urban space image according to best urban planning practices. Create a realistic visualization that incorporates the following specific improvements:

{recommendations}

Apply these urban planning principles:
{principles}

CRITICAL REQUIREMENTS:
1. Make REALISTIC and PRACTICAL changes that could actually be implemented in this exact location
2. Maintain the EXACT same perspective, angle, and scale as the original image
3. The result must be PHOTOREALISTIC - not a sketch, drawing, or cartoon
4. Keep the same buildings and major infrastructure, but enhance them with the suggested improvements
5. Preserve the character and unique identity of the original location
6. Do not add floating text, labels, arrows, or UI elements to the image

IMPORTANT: Do not create an entirely new scene. The improved version should be clearly recognizable as the same location with specific enhancements applied. Someone familiar with this location should be able to recognize it after the improvements.

Generate a detailed visualization showing how these urban improvements would look when implemented at this exact location."#
    )
}

fn bullet_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items
        .map(|item| format!("- {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

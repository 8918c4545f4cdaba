//! Structured assessment of one urban space image

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Planning category shared by issues and recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Category {
    Walkability,
    Transportation,
    PublicSpace,
    Greenery,
    Safety,
    Accessibility,
    Infrastructure,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Walkability,
        Category::Transportation,
        Category::PublicSpace,
        Category::Greenery,
        Category::Safety,
        Category::Accessibility,
        Category::Infrastructure,
        Category::Other,
    ];

    /// Human-readable label, as used in prompts and reports
    pub fn label(&self) -> &'static str {
        match self {
            Category::Walkability => "Walkability",
            Category::Transportation => "Transportation",
            Category::PublicSpace => "Public Space",
            Category::Greenery => "Greenery",
            Category::Safety => "Safety",
            Category::Accessibility => "Accessibility",
            Category::Infrastructure => "Infrastructure",
            Category::Other => "Other",
        }
    }

    /// Every label, comma separated
    pub fn all_labels() -> String {
        Category::ALL
            .iter()
            .map(Category::label)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Parse leniently: case, spaces, hyphens and underscores are ignored.
    /// Anything unrecognized is `Other`.
    pub fn parse(s: &str) -> Category {
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "walkability" => Category::Walkability,
            "transportation" | "transport" | "transit" => Category::Transportation,
            "publicspace" | "publicspaces" => Category::PublicSpace,
            "greenery" | "greenspace" | "green" => Category::Greenery,
            "safety" => Category::Safety,
            "accessibility" => Category::Accessibility,
            "infrastructure" => Category::Infrastructure,
            _ => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Category::parse(&s))
    }
}

/// A problem identified in the current space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub category: Category,
    pub details: String,
}

/// One proposed improvement; each becomes one incremental generation step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: Category,
    pub recommendation: String,
    pub expected_benefits: String,
}

/// Structured analysis produced once per analysis call
///
/// `recommendations` order defines the order of incremental generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analysis {
    pub overall_description: String,
    pub identified_issues: Vec<Issue>,
    pub recommendations: Vec<Recommendation>,
    pub principles: Vec<String>,
    /// Original model text, kept when the structured parse failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl Analysis {
    /// Synthetic analysis used when the model text has no usable JSON
    pub fn fallback(raw_text: &str) -> Self {
        Self {
            overall_description: "Urban space requiring improvements".to_string(),
            identified_issues: vec![Issue {
                category: Category::Other,
                details: "Please see the full analysis text below".to_string(),
            }],
            recommendations: vec![Recommendation {
                category: Category::Other,
                recommendation: "See full analysis text".to_string(),
                expected_benefits: "Multiple benefits detailed in analysis".to_string(),
            }],
            principles: vec![
                "Improved walkability".to_string(),
                "Enhanced public spaces".to_string(),
                "Increased greenery".to_string(),
                "Better sustainability".to_string(),
            ],
            raw_text: Some(raw_text.to_string()),
        }
    }

    /// True when this analysis is the reduced-fidelity fallback
    pub fn is_degraded(&self) -> bool {
        self.raw_text.is_some()
    }
}

//! Response parser: structured analysis from free-form model text
//!
//! Two stages:
//! 1. Locate candidate JSON substrings: fenced blocks marked `json`, then any
//!    fenced block whose body starts with `{`, then every balanced-brace span
//!    in order of its opening brace.
//! 2. Decode each candidate in order; the first JSON object carrying at least
//!    one known analysis key wins.
//!
//! When no candidate decodes, the synthetic fallback is returned with the
//! original text attached. `parse` never fails.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::types::{Analysis, Category, Issue, Recommendation};

fn fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*([A-Za-z]*)[ \t]*\r?\n(.*?)```").expect("fence regex is valid")
    })
}

/// Parse model text into an `Analysis`, degrading to the fallback on failure
pub fn parse(raw_text: &str) -> Analysis {
    for candidate in candidates(raw_text) {
        if let Some(analysis) = decode(candidate) {
            debug!(
                "Parsed analysis with {} recommendations",
                analysis.recommendations.len()
            );
            return analysis;
        }
    }

    warn!("Could not parse analysis response as JSON, using fallback analysis");
    Analysis::fallback(raw_text)
}

/// Candidate JSON substrings in preference order
pub fn candidates(text: &str) -> Vec<&str> {
    let mut marked = Vec::new();
    let mut unmarked = Vec::new();

    for caps in fence_regex().captures_iter(text) {
        let lang = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let Some(body) = caps.get(2).map(|m| m.as_str().trim()) else {
            continue;
        };
        if lang.eq_ignore_ascii_case("json") {
            marked.push(body);
        } else if body.starts_with('{') {
            unmarked.push(body);
        }
    }

    let mut out = marked;
    out.extend(unmarked);
    for span in balanced_spans(text) {
        if !out.contains(&span) {
            out.push(span);
        }
    }
    out
}

/// Every `{...}` span with balanced braces, by position of its opening brace
///
/// Openings that never close are skipped, so a stray `{` in prose does not
/// hide JSON that follows it.
pub fn balanced_spans(text: &str) -> Vec<&str> {
    text.match_indices('{')
        .filter_map(|(start, _)| balanced_span_at(text, start))
        .collect()
}

/// Span opening at byte `start`, ignoring braces inside JSON strings
fn balanced_span_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Decode one candidate; `None` when it is not an analysis-shaped object
fn decode(candidate: &str) -> Option<Analysis> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let obj = value.as_object()?;
    let assessment = obj.get("current_assessment").and_then(Value::as_object);

    let description = assessment
        .and_then(|a| a.get("overall_description"))
        .or_else(|| obj.get("overall_description"));
    let issues = assessment
        .and_then(|a| a.get("identified_issues"))
        .or_else(|| obj.get("identified_issues"));
    let recommendations = obj
        .get("improvement_recommendations")
        .or_else(|| obj.get("recommendations"));
    let principles = obj
        .get("urban_planning_principles")
        .or_else(|| obj.get("principles"));

    if description.is_none() && issues.is_none() && recommendations.is_none() && principles.is_none()
    {
        return None;
    }

    Some(Analysis {
        overall_description: description
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        identified_issues: items(issues).filter_map(issue_from).collect(),
        recommendations: items(recommendations)
            .filter_map(recommendation_from)
            .collect(),
        principles: items(principles)
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        raw_text: None,
    })
}

fn items(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flat_map(|arr| arr.iter())
}

fn text_field(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn category_field(obj: &Map<String, Value>) -> Category {
    obj.get("category")
        .and_then(Value::as_str)
        .map(Category::parse)
        .unwrap_or_default()
}

fn issue_from(value: &Value) -> Option<Issue> {
    match value {
        Value::Object(obj) => Some(Issue {
            category: category_field(obj),
            details: text_field(obj, &["details", "description"]),
        }),
        Value::String(s) => Some(Issue {
            category: Category::Other,
            details: s.clone(),
        }),
        _ => None,
    }
}

fn recommendation_from(value: &Value) -> Option<Recommendation> {
    match value {
        Value::Object(obj) => Some(Recommendation {
            category: category_field(obj),
            recommendation: text_field(obj, &["recommendation", "description"]),
            expected_benefits: text_field(obj, &["expected_benefits", "benefits"]),
        }),
        Value::String(s) => Some(Recommendation {
            category: Category::Other,
            recommendation: s.clone(),
            expected_benefits: String::new(),
        }),
        _ => None,
    }
}

//! Urban space analysis
//!
//! Provides:
//! - Analysis data model (issues, recommendations, principles)
//! - Response parser with graceful fallback
//! - Prompt builders for analysis and visualization calls
//! - Plain-text report rendering

pub mod parser;
pub mod prompts;
pub mod report;
mod types;

pub use parser::parse;
pub use types::{Analysis, Category, Issue, Recommendation};

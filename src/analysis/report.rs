//! Plain-text analysis report

use chrono::{DateTime, Utc};

use super::types::Analysis;

/// Render a downloadable text report for an analysis
pub fn render(analysis: &Analysis, date: DateTime<Utc>) -> String {
    let mut out = String::from("URBAN PLANNING ANALYSIS REPORT\n");
    out.push_str("==============================\n\n");
    out.push_str(&format!("Date: {}\n\n", date.format("%Y-%m-%d %H:%M:%S UTC")));

    section(&mut out, "CURRENT ASSESSMENT");
    out.push_str(&analysis.overall_description);
    out.push_str("\n\n");

    section(&mut out, "IDENTIFIED ISSUES");
    for (i, issue) in analysis.identified_issues.iter().enumerate() {
        out.push_str(&format!("{}. {}: {}\n", i + 1, issue.category, issue.details));
    }
    out.push('\n');

    section(&mut out, "RECOMMENDATIONS");
    for (i, rec) in analysis.recommendations.iter().enumerate() {
        out.push_str(&format!(
            "{}. {}: {}\n   Benefits: {}\n\n",
            i + 1,
            rec.category,
            rec.recommendation,
            rec.expected_benefits
        ));
    }

    section(&mut out, "URBAN PLANNING PRINCIPLES");
    for (i, principle) in analysis.principles.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, principle));
    }

    if let Some(raw) = &analysis.raw_text {
        out.push('\n');
        section(&mut out, "FULL ANALYSIS TEXT");
        out.push_str(raw);
        out.push('\n');
    }

    out
}

fn section(out: &mut String, title: &str) {
    out.push_str(title);
    out.push('\n');
    out.push_str(&"-".repeat(title.len()));
    out.push('\n');
}

//! LLM prompts for the matching and export stages.
//!
//! Responses are checked by [`crate::pipeline::validate`], so the shapes
//! described here must stay in sync with the validation rules.

use crate::pipeline::report::REPORT_COLUMNS;

/// System prompt for the matching analyst.
pub const MATCHING_SYSTEM_PROMPT: &str = "You are a market analysis expert specializing in \
cross-platform prediction market comparison. You group markets that refer to the same event \
or outcome and you are conservative with matches.";

/// Prompt for grouping equivalent markets across sites.
pub const MATCHING_PROMPT: &str = r#"Analyze these prediction market records collected from several websites.

Identify records that refer to the same event or outcome and group them.
A record that matches nothing else forms its own group.

Output JSON only:
{
    "matched_products": [
        {
            "unified_title": "standardized name",
            "products": [{"title": "...", "price": "...", "category": "...", "site": "...", "confidence_score": 0.0}],
            "match_confidence": 0.85,
            "sites": ["site1", "site2"],
            "price_analysis": {"site1_price": "...", "site2_price": "...", "price_difference": "..."}
        }
    ],
    "total_unique_products": 0,
    "analysis_summary": "one or two sentences"
}

Records:
{records}"#;

/// System prompt for the export analyst.
pub const EXPORT_SYSTEM_PROMPT: &str = "You are a data organization expert. You turn matched \
market data into a clean CSV report and always start your answer with the CSV data.";

/// Prompt for rendering matched groups as CSV.
pub const EXPORT_PROMPT: &str = r#"Organize the matched product groups below into a CSV report.

Required columns, in this order:
{columns}

Rules:
- comma-separated, header row first
- one row per group
- use "N/A" for missing values
- timestamps in RFC 3339
- wrap the output in a ```csv code block and add nothing else

Matched groups:
{groups}"#;

/// Format the matching prompt with serialized records.
pub fn format_matching_prompt(records_json: &str) -> String {
    MATCHING_PROMPT.replace("{records}", records_json)
}

/// Format the export prompt with serialized groups.
pub fn format_export_prompt(groups_json: &str) -> String {
    EXPORT_PROMPT
        .replace("{columns}", &REPORT_COLUMNS.join(", "))
        .replace("{groups}", groups_json)
}

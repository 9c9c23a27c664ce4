//! Analyst trait for the LLM-driven stages.
//!
//! The analyst covers the two stages that hand collected data to a model:
//! - Matching records that describe the same market across sites
//! - Formatting matched groups as a CSV report
//!
//! Both return raw text; the flow validates it before using it.

use async_trait::async_trait;

use crate::error::CollaboratorResult;

#[async_trait]
pub trait Analyst: Send + Sync {
    /// Group equivalent markets.
    ///
    /// `records_json` is a JSON array of records. The answer should parse as
    /// `{matched_products[], total_unique_products, analysis_summary}`.
    async fn match_products(&self, records_json: &str) -> CollaboratorResult<String>;

    /// Render matched groups as CSV.
    ///
    /// `groups_json` is a JSON array of match groups. The answer should begin
    /// with CSV content in the fixed report column order.
    async fn format_csv(&self, groups_json: &str) -> CollaboratorResult<String>;
}

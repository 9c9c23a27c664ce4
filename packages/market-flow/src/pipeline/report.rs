//! Reporter - decides what artifact gets persisted and summarizes the run.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::PersistError;
use crate::pipeline::validate::strip_code_fence;
use crate::types::{
    state::RunState,
    summary::{round3, row_count, RunSummary},
};

/// Fixed column order of the CSV report.
pub const REPORT_COLUMNS: [&str; 10] = [
    "unified_title",
    "category",
    "polymarket_price",
    "kalshi_price",
    "other_site_price",
    "price_difference",
    "sites_available",
    "confidence_level",
    "volume_info",
    "last_updated",
];

/// Placeholder message when no site produced usable records.
pub const NO_DATA_SENTINEL: &str = "No data collected - all scraping attempts failed";

/// Placeholder message when collection worked but nothing could be matched.
pub const NO_MATCHES_SENTINEL: &str = "No products could be matched across sites";

/// Placeholder message when the report itself was unusable.
pub const REPORT_FAILED_SENTINEL: &str = "Report generation failed - see run errors";

/// Persists artifacts to a single configured location.
#[derive(Debug, Clone)]
pub struct Reporter {
    output_path: PathBuf,
}

impl Reporter {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
        }
    }

    /// Single-row report carrying `sentinel` as the title.
    pub fn placeholder_artifact(sentinel: &str, at: DateTime<Utc>) -> String {
        let row = [
            sentinel.to_string(),
            "N/A".to_string(),
            "N/A".to_string(),
            "N/A".to_string(),
            "N/A".to_string(),
            "N/A".to_string(),
            "0".to_string(),
            "0.0".to_string(),
            "N/A".to_string(),
            at.to_rfc3339(),
        ];
        format!("{}\n{}\n", REPORT_COLUMNS.join(","), row.join(","))
    }

    /// Report text as it should land on disk: no code fence, newline-terminated.
    pub fn clean_artifact(text: &str) -> String {
        let mut cleaned = strip_code_fence(text).to_string();
        if !cleaned.ends_with('\n') {
            cleaned.push('\n');
        }
        cleaned
    }

    /// Write `content` to the output path, creating parent directories.
    pub async fn persist(&self, content: &str) -> Result<PathBuf, PersistError> {
        let io_err = |source| PersistError::Io {
            path: self.output_path.clone(),
            source,
        };

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        tokio::fs::write(&self.output_path, content)
            .await
            .map_err(io_err)?;

        info!(
            path = %self.output_path.display(),
            bytes = content.len(),
            "Artifact written"
        );
        Ok(self.output_path.clone())
    }

    /// Build the summary for a run in its current state.
    pub fn summarize(&self, state: &RunState) -> RunSummary {
        RunSummary {
            run_id: state.run_id,
            flow_success: state.flow_success,
            phase: state.phase,
            sites_attempted: state.collection_results.len(),
            sites_succeeded: state.successful_sites(),
            total_records: state.total_records,
            unique_groups: state.unique_groups,
            mean_confidence: round3(state.match_confidence),
            artifact_path: state.artifact_path.clone(),
            row_count: state.artifact.as_deref().map(row_count).unwrap_or(0),
            timestamp: Utc::now(),
            errors: state.errors.clone(),
        }
    }

    /// Human-readable status report.
    pub fn render_status(state: &RunState) -> String {
        let status = if state.flow_success {
            "SUCCESS"
        } else {
            "ISSUES ENCOUNTERED"
        };
        let csv = match &state.artifact_path {
            Some(path) => format!("CSV: {}", path.display()),
            None => "CSV: not written".to_string(),
        };

        let mut lines = vec![
            "Execution Results".to_string(),
            format!("STATUS: {}", status),
            format!("Run: {}", state.run_id),
            format!(
                "Sites: {}/{} succeeded, {} records collected",
                state.successful_sites(),
                state.collection_results.len(),
                state.total_records
            ),
            format!(
                "Matching: {} unique products, mean confidence {:.3}",
                state.unique_groups, state.match_confidence
            ),
            csv,
        ];

        if !state.errors.is_empty() {
            lines.push("Errors:".to_string());
            lines.extend(state.errors.iter().map(|entry| format!("- {}", entry)));
        }

        lines.join("\n") + "\n"
    }
}

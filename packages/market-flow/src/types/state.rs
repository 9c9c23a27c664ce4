//! Run state owned by the flow controller.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{MatchGroup, Record};
use super::summary::RunSummary;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Initialization,
    DataCollection,
    ProductMatching,
    CsvGeneration,
    CollectionFailure,
    Terminal,
}

impl Phase {
    /// Tag used in logs and error entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialization => "initialization",
            Self::DataCollection => "data_collection",
            Self::ProductMatching => "product_matching",
            Self::CsvGeneration => "csv_generation",
            Self::CollectionFailure => "collection_failure",
            Self::Terminal => "terminal",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failure observed during a stage. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub phase: Phase,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.phase, self.message)
    }
}

/// Outcome of collecting from one site. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionResult {
    pub site: String,

    /// Collaborator output as received (empty if the call itself failed).
    pub raw_output: String,

    pub success: bool,

    /// Normalized records; empty on failure.
    pub records: Vec<Record>,

    /// Why the site failed, if it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CollectionResult {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Accumulated state of one pipeline execution.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,

    pub phase: Phase,

    pub collection_results: Vec<CollectionResult>,
    pub errors: Vec<ErrorEntry>,
    pub total_records: usize,

    pub matched_groups: Vec<MatchGroup>,
    pub match_confidence: f64,
    pub unique_groups: usize,

    /// Matching was skipped because no successful site produced records.
    pub nothing_to_match: bool,

    /// Text of the persisted artifact (report or placeholder).
    pub artifact: Option<String>,
    pub artifact_path: Option<PathBuf>,

    pub summary: Option<RunSummary>,
    pub flow_success: bool,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::now_v7(),
            started_at: Utc::now(),
            finished_at: None,
            phase: Phase::Initialization,
            collection_results: Vec::new(),
            errors: Vec::new(),
            total_records: 0,
            matched_groups: Vec::new(),
            match_confidence: 0.0,
            unique_groups: 0,
            nothing_to_match: false,
            artifact: None,
            artifact_path: None,
            summary: None,
            flow_success: false,
        }
    }

    pub(crate) fn record_error(&mut self, phase: Phase, message: impl Into<String>) {
        self.errors.push(ErrorEntry::new(phase, message));
    }

    /// Number of sites that produced at least one usable record.
    pub fn successful_sites(&self) -> usize {
        self.collection_results.iter().filter(|r| r.success).count()
    }

    /// All normalized records from successful sites, in collection order.
    pub fn working_set(&self) -> Vec<Record> {
        self.collection_results
            .iter()
            .filter(|r| r.success)
            .flat_map(|r| {
                r.records.iter().cloned().map(|mut record| {
                    if record.site.is_empty() || record.site == "unknown" {
                        record.site = r.site.clone();
                    }
                    record
                })
            })
            .collect()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

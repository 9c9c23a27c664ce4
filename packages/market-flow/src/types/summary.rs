//! Final run summary.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::state::{ErrorEntry, Phase};

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub flow_success: bool,
    pub phase: Phase,
    pub sites_attempted: usize,
    pub sites_succeeded: usize,
    pub total_records: usize,
    pub unique_groups: usize,

    /// Rounded to 3 decimals.
    pub mean_confidence: f64,

    pub artifact_path: Option<PathBuf>,

    /// Data rows in the artifact (header excluded).
    pub row_count: usize,

    pub timestamp: DateTime<Utc>,
    pub errors: Vec<ErrorEntry>,
}

/// Round to 3 decimal places.
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Data rows in a CSV text: non-blank lines minus the header.
pub fn row_count(csv: &str) -> usize {
    csv.lines()
        .filter(|line| !line.trim().is_empty())
        .count()
        .saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round3() {
        assert_eq!(round3(0.70000000001), 0.7);
        assert_eq!(round3(0.12345), 0.123);
        assert_eq!(round3(0.0), 0.0);
    }

    #[test]
    fn test_row_count() {
        assert_eq!(row_count("a,b\n1,2\n3,4\n"), 2);
        assert_eq!(row_count("a,b\n\n1,2\n\n"), 1);
        assert_eq!(row_count(""), 0);
        assert_eq!(row_count("header only"), 0);
    }
}

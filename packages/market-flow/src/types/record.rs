//! Records, match groups, and the normalized payloads each stage produces.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price recorded when a site did not report one.
pub const UNKNOWN_PRICE: &str = "Unknown";

/// Category recorded when a site did not report one.
pub const DEFAULT_CATEGORY: &str = "General";

/// Confidence assigned when a site did not report a usable one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// One scraped market.
///
/// A record always has a non-empty title; anything without one is dropped
/// during validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub title: String,
    pub price: String,
    pub category: String,
    pub site: String,
    pub confidence_score: f64,
}

impl Record {
    /// Create a record with default price, category and confidence.
    pub fn new(title: impl Into<String>, site: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            price: UNKNOWN_PRICE.to_string(),
            category: DEFAULT_CATEGORY.to_string(),
            site: site.into(),
            confidence_score: DEFAULT_CONFIDENCE,
        }
    }

    /// Set the price.
    pub fn with_price(mut self, price: impl Into<String>) -> Self {
        self.price = price.into();
        self
    }

    /// Set the category.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the confidence, clamped to [0, 1].
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = clamp_unit(confidence);
        self
    }
}

/// A set of records that refer to the same market across sites.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchGroup {
    pub unified_title: String,

    /// Never empty.
    pub products: Vec<Record>,

    pub match_confidence: f64,

    /// Contributing sites, deduplicated.
    pub sites: BTreeSet<String>,

    /// Free-form price comparison the analyst may attach.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_analysis: Option<serde_json::Value>,
}

impl MatchGroup {
    /// Mean confidence of the member records, `None` for an empty group.
    pub fn member_confidence(products: &[Record]) -> Option<f64> {
        if products.is_empty() {
            return None;
        }
        let sum: f64 = products.iter().map(|p| p.confidence_score).sum();
        Some(sum / products.len() as f64)
    }
}

/// Normalized output of one site's collection stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteBatch {
    pub site: String,
    pub products: Vec<Record>,
    pub products_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Normalized output of the matching stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSet {
    pub matched_products: Vec<MatchGroup>,
    pub total_unique_products: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Accepted output of the export stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportArtifact {
    pub csv_content: String,
    pub timestamp: DateTime<Utc>,
}

/// Accepted output of a stage without a dedicated rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralOutput {
    pub output: String,
    pub agent: String,
    /// Set when the output looks like it describes a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Mean of group confidences; exactly 0.0 for no groups.
pub fn mean_confidence(groups: &[MatchGroup]) -> f64 {
    if groups.is_empty() {
        return 0.0;
    }
    groups.iter().map(|g| g.match_confidence).sum::<f64>() / groups.len() as f64
}

pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        DEFAULT_CONFIDENCE
    } else {
        value.clamp(0.0, 1.0)
    }
}

//! Stage output validation.
//!
//! Every stage hands back untrusted text. Each stage kind has one rule that
//! either accepts the text as a normalized payload or rejects it with a
//! [`ValidationError`]. Validation never panics past this module: an
//! internal failure becomes [`ValidationError::Internal`].

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::types::record::{
    clamp_unit, ExportArtifact, GeneralOutput, MatchGroup, MatchSet, Record, SiteBatch,
    DEFAULT_CATEGORY, DEFAULT_CONFIDENCE, UNKNOWN_PRICE,
};

/// Shortest export text (trimmed, in characters) that is accepted.
pub const MIN_EXPORT_CHARS: usize = 50;

/// Shortest general output (trimmed, in characters) that is accepted.
pub const MIN_GENERAL_CHARS: usize = 10;

/// Column names of which an export must mention at least two.
pub const EXPORT_COLUMN_TOKENS: [&str; 4] = ["unified_title", "price", "sites", "confidence"];

/// Substrings that flag a general output as suspicious.
pub const FAILURE_INDICATORS: [&str; 4] = ["error", "failed", "exception", "traceback"];

/// Which rule applies to a stage output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Collection,
    Matching,
    Export,
    General,
}

/// Normalized payload of an accepted stage output.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Collection(SiteBatch),
    Matching(MatchSet),
    Export(ExportArtifact),
    General(GeneralOutput),
}

/// Accepted payload or structured rejection.
pub type Verdict<T = Payload> = std::result::Result<T, ValidationError>;

/// Validate `raw` with the rule for `kind`.
pub fn validate(kind: StageKind, raw: &str) -> Verdict {
    match kind {
        StageKind::Collection => validate_collection(raw).map(Payload::Collection),
        StageKind::Matching => validate_matching(raw).map(Payload::Matching),
        StageKind::Export => validate_export(raw).map(Payload::Export),
        StageKind::General => validate_general(raw, "unknown").map(Payload::General),
    }
}

/// Validate one site's scrape output.
pub fn validate_collection(raw: &str) -> Verdict<SiteBatch> {
    guarded("collection", || {
        let parsed = parse_object(raw)?;
        require_fields(&parsed, &["products", "site"])?;

        let site = scalar_text(parsed.get("site")).unwrap_or_else(|| "unknown".to_string());

        let candidates = parsed
            .get("products")
            .and_then(Value::as_array)
            .ok_or_else(|| ValidationError::schema("products must be a list"))?;
        if candidates.is_empty() {
            return Err(ValidationError::empty(format!(
                "No products found for site {}",
                site
            )));
        }

        let products: Vec<Record> = candidates
            .iter()
            .filter_map(|candidate| normalize_record(candidate, &site))
            .collect();

        if products.is_empty() {
            return Err(ValidationError::empty(
                "No valid products after validation",
            ));
        }

        debug!(
            site = %site,
            kept = products.len(),
            dropped = candidates.len() - products.len(),
            "Collection output accepted"
        );

        Ok(SiteBatch {
            site,
            products_count: products.len(),
            products,
            timestamp: Utc::now(),
        })
    })
}

/// Validate the matching stage output.
pub fn validate_matching(raw: &str) -> Verdict<MatchSet> {
    guarded("matching", || {
        let parsed = parse_object(raw)?;
        require_fields(&parsed, &["matched_products", "total_unique_products"])?;

        let candidates = parsed
            .get("matched_products")
            .and_then(Value::as_array)
            .ok_or_else(|| ValidationError::schema("matched_products must be a list"))?;

        let groups: Vec<MatchGroup> = candidates.iter().filter_map(normalize_group).collect();

        if groups.is_empty() {
            return Err(ValidationError::empty("No valid product matches found"));
        }

        debug!(
            kept = groups.len(),
            dropped = candidates.len() - groups.len(),
            "Matching output accepted"
        );

        Ok(MatchSet {
            total_unique_products: groups.len(),
            matched_products: groups,
            analysis_summary: scalar_text(parsed.get("analysis_summary")),
            timestamp: Utc::now(),
        })
    })
}

/// Sanity-check the export stage output.
///
/// This only looks for marker substrings and a minimum length; the CSV is
/// never parsed.
pub fn validate_export(raw: &str) -> Verdict<ExportArtifact> {
    guarded("export", || {
        if !raw.to_lowercase().contains("csv") {
            return Err(ValidationError::parse("No CSV content", raw));
        }

        let columns_present = EXPORT_COLUMN_TOKENS
            .iter()
            .filter(|token| raw.contains(*token))
            .count();
        if columns_present < 2 {
            return Err(ValidationError::schema("CSV missing required columns"));
        }

        if raw.trim().chars().count() < MIN_EXPORT_CHARS {
            return Err(ValidationError::empty("CSV output too short"));
        }

        Ok(ExportArtifact {
            csv_content: raw.to_string(),
            timestamp: Utc::now(),
        })
    })
}

/// Fallback rule for stages without a dedicated one.
///
/// Output that mentions a failure indicator is still accepted, with a
/// warning attached.
pub fn validate_general(raw: &str, agent: &str) -> Verdict<GeneralOutput> {
    guarded("general", || {
        if raw.trim().chars().count() < MIN_GENERAL_CHARS {
            return Err(ValidationError::empty(format!(
                "Output from {} too short",
                agent
            )));
        }

        let lower = raw.to_lowercase();
        let warning = FAILURE_INDICATORS
            .iter()
            .any(|indicator| lower.contains(indicator))
            .then(|| "Potential error indicators found".to_string());

        Ok(GeneralOutput {
            output: raw.to_string(),
            agent: agent.to_string(),
            warning,
            timestamp: Utc::now(),
        })
    })
}

/// Strip a surrounding Markdown code fence (```` ```json ```` / ```` ```csv ````).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return trimmed,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Run a rule, turning a panic inside it into a rejection.
fn guarded<T>(rule: &str, f: impl FnOnce() -> Verdict<T>) -> Verdict<T> {
    let verdict = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(verdict) => verdict,
        Err(panic_info) => {
            let message = if let Some(s) = panic_info.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            Err(ValidationError::Internal(message))
        }
    };

    if let Err(e) = &verdict {
        warn!(rule, kind = e.kind(), error = %e, "Stage output rejected");
    }
    verdict
}

fn parse_object(raw: &str) -> Verdict<Map<String, Value>> {
    let value: Value = serde_json::from_str(strip_code_fence(raw))
        .map_err(|e| ValidationError::parse(format!("Invalid JSON format: {}", e), raw))?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::schema("Output must be a JSON object")),
    }
}

fn require_fields(parsed: &Map<String, Value>, fields: &[&str]) -> Verdict<()> {
    let missing: Vec<&str> = fields
        .iter()
        .copied()
        .filter(|f| !parsed.contains_key(*f))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::schema(format!(
            "Missing fields: {}",
            missing.join(", ")
        )))
    }
}

/// Text of a scalar JSON value; `None` for absent, null, blank or composite.
fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Coerce a confidence to [0, 1], falling back to the default.
fn coerce_confidence(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed.is_finite().then(|| clamp_unit(parsed))
}

fn non_empty_title(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn build_record(item: &Map<String, Value>, title: String, fallback_site: &str) -> Record {
    Record {
        title,
        price: scalar_text(item.get("price")).unwrap_or_else(|| UNKNOWN_PRICE.to_string()),
        category: scalar_text(item.get("category"))
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
        site: scalar_text(item.get("site")).unwrap_or_else(|| fallback_site.to_string()),
        confidence_score: coerce_confidence(item.get("confidence_score"))
            .unwrap_or(DEFAULT_CONFIDENCE),
    }
}

/// A scraped record; dropped unless it has a non-empty string title.
fn normalize_record(candidate: &Value, site: &str) -> Option<Record> {
    let item = candidate.as_object()?;
    let title = non_empty_title(item.get("title"))?;
    Some(build_record(item, title, site))
}

/// A match group; dropped without a unified title or members.
fn normalize_group(candidate: &Value) -> Option<MatchGroup> {
    let group = candidate.as_object()?;
    let unified_title = non_empty_title(group.get("unified_title"))?;

    // Members come back from the model and may omit their own title.
    let products: Vec<Record> = group
        .get("products")?
        .as_array()?
        .iter()
        .filter_map(Value::as_object)
        .map(|member| {
            let title =
                non_empty_title(member.get("title")).unwrap_or_else(|| unified_title.clone());
            build_record(member, title, "unknown")
        })
        .collect();

    let member_mean = MatchGroup::member_confidence(&products)?;
    let match_confidence = coerce_confidence(group.get("match_confidence")).unwrap_or(member_mean);
    let sites: BTreeSet<String> = products.iter().map(|p| p.site.clone()).collect();

    Some(MatchGroup {
        unified_title,
        products,
        match_confidence,
        sites,
        price_analysis: group.get("price_analysis").filter(|v| !v.is_null()).cloned(),
    })
}

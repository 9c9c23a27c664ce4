//! Market flow pipeline - the core of the library.
//!
//! The pipeline runs:
//! - Collection (one scrape per configured site)
//! - Validation of every collaborator output
//! - Cross-site product matching
//! - CSV report generation and persistence

pub mod controller;
pub mod executor;
pub mod prompts;
pub mod report;
pub mod validate;

pub use controller::{route_after_collection, FlowController};
pub use executor::{Attempt, StageExecutor};
pub use prompts::{
    format_export_prompt, format_matching_prompt, EXPORT_PROMPT, EXPORT_SYSTEM_PROMPT,
    MATCHING_PROMPT, MATCHING_SYSTEM_PROMPT,
};
pub use report::{
    Reporter, NO_DATA_SENTINEL, NO_MATCHES_SENTINEL, REPORT_COLUMNS, REPORT_FAILED_SENTINEL,
};
pub use validate::{
    strip_code_fence, validate, validate_collection, validate_export, validate_general,
    validate_matching, Payload, StageKind, Verdict,
};

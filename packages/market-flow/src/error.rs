//! Typed errors for the market flow library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Only [`FlowError`] ever escapes the controller. Everything else is caught
//! at the boundary where it occurs and turned into a rejection or an
//! [`ErrorEntry`](crate::types::state::ErrorEntry).

use std::path::PathBuf;

use thiserror::Error;

/// Framework-level orchestration faults.
///
/// These indicate a misuse of the controller or an invalid configuration,
/// never a bad stage output.
#[derive(Debug, Error)]
pub enum FlowError {
    /// The controller already reached its terminal state
    #[error("flow already terminal")]
    AlreadyTerminal,

    /// Configuration was rejected before the run started
    #[error("config error: {0}")]
    Config(String),

    /// A run summary could not be serialized
    #[error("JSON serialize error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure inside a collaborator call (site scrape, matching, export).
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The unit of work exceeded its time budget
    #[error("timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    /// LLM service unavailable or failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// Collaborator answered with something it could not produce a payload for
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The collaborator panicked while running
    #[error("collaborator panicked: {0}")]
    Panicked(String),
}

/// Why a stage output was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Stage output is not well-formed for its expected shape
    #[error("{message}")]
    Parse { message: String, raw: String },

    /// Well-formed but missing required fields
    #[error("{message}")]
    Schema { message: String },

    /// Schema-valid but zero usable items after filtering
    #[error("{message}")]
    EmptyResult { message: String },

    /// The validator itself failed while inspecting the output
    #[error("Validation exception: {0}")]
    Internal(String),
}

impl ValidationError {
    pub(crate) fn parse(message: impl Into<String>, raw: &str) -> Self {
        Self::Parse {
            message: message.into(),
            raw: raw.chars().take(500).collect(),
        }
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub(crate) fn empty(message: impl Into<String>) -> Self {
        Self::EmptyResult {
            message: message.into(),
        }
    }

    /// Stable code for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "JSON_PARSE_ERROR",
            Self::Schema { .. } => "SCHEMA_ERROR",
            Self::EmptyResult { .. } => "EMPTY_RESULT",
            Self::Internal(_) => "VALIDATION_EXCEPTION",
        }
    }
}

/// Artifact write failure.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for flow operations.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Result type alias for collaborator calls.
pub type CollaboratorResult<T> = std::result::Result<T, CollaboratorError>;

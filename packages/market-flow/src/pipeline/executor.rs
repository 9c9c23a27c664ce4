//! Stage executor - runs one unit of work against a collaborator.
//!
//! A unit is one site scrape, one matching pass, or one export pass. The
//! executor never lets a collaborator failure escape: errors, timeouts and
//! panics all come back as a failed [`Attempt`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::error::{CollaboratorError, CollaboratorResult};
use crate::traits::{
    analyst::Analyst,
    scraper::{ScrapeRequest, SiteScraper},
};
use crate::types::record::{MatchGroup, Record};

/// Result of one collaborator invocation.
#[derive(Debug)]
pub struct Attempt {
    /// Label of the unit (site name, "matching", "export")
    pub unit: String,

    pub result: CollaboratorResult<String>,

    pub elapsed: Duration,
}

impl Attempt {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Collaborator output, if the call completed.
    pub fn output(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }

    /// Failure message, if the call failed.
    pub fn error_message(&self) -> Option<String> {
        self.result.as_ref().err().map(|e| e.to_string())
    }
}

/// Invokes collaborators one unit at a time.
#[derive(Debug, Clone, Default)]
pub struct StageExecutor {
    timeout: Option<Duration>,
}

impl StageExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every unit by `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Scrape one site.
    pub async fn collect<S>(&self, scraper: &S, request: &ScrapeRequest) -> Attempt
    where
        S: SiteScraper + ?Sized,
    {
        self.invoke(request.site.clone(), scraper.scrape(request))
            .await
    }

    /// Run one matching pass over the full working set.
    pub async fn match_products<A>(&self, analyst: &A, records: &[Record]) -> Attempt
    where
        A: Analyst + ?Sized,
    {
        let records_json = match serde_json::to_string_pretty(records) {
            Ok(json) => json,
            Err(e) => return Self::failed("matching", CollaboratorError::InvalidResponse(e.to_string())),
        };
        self.invoke("matching".to_string(), analyst.match_products(&records_json))
            .await
    }

    /// Run one export pass over all matched groups.
    pub async fn export<A>(&self, analyst: &A, groups: &[MatchGroup]) -> Attempt
    where
        A: Analyst + ?Sized,
    {
        let groups_json = match serde_json::to_string_pretty(groups) {
            Ok(json) => json,
            Err(e) => return Self::failed("export", CollaboratorError::InvalidResponse(e.to_string())),
        };
        self.invoke("export".to_string(), analyst.format_csv(&groups_json))
            .await
    }

    async fn invoke<F>(&self, unit: String, call: F) -> Attempt
    where
        F: Future<Output = CollaboratorResult<String>>,
    {
        let start = Instant::now();
        debug!(unit = %unit, "Invoking collaborator");

        // AssertUnwindSafe is required because collaborator futures are not UnwindSafe
        let guarded = AssertUnwindSafe(call).catch_unwind();

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(CollaboratorError::Timeout {
                    limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })),
            },
            None => guarded.await,
        };

        let result = match outcome {
            Ok(result) => result,
            Err(panic_info) => {
                let panic_msg = extract_panic_message(&panic_info);
                error!(unit = %unit, panic = %panic_msg, "Collaborator panicked");
                Err(CollaboratorError::Panicked(panic_msg))
            }
        };

        let elapsed = start.elapsed();
        match &result {
            Ok(output) => debug!(
                unit = %unit,
                bytes = output.len(),
                duration_ms = elapsed.as_millis(),
                "Collaborator completed"
            ),
            Err(e) => warn!(unit = %unit, error = %e, "Collaborator failed"),
        }

        Attempt {
            unit,
            result,
            elapsed,
        }
    }

    fn failed(unit: &str, error: CollaboratorError) -> Attempt {
        warn!(unit, error = %error, "Could not prepare collaborator input");
        Attempt {
            unit: unit.to_string(),
            result: Err(error),
            elapsed: Duration::ZERO,
        }
    }
}

fn extract_panic_message(panic_info: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_info.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

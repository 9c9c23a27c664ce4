//! Flow controller - the state machine that drives a run.
//!
//! ```text
//! initialization ──► data_collection ──(records > 0)──► product_matching ──► csv_generation ──► terminal
//!                                   └──(records = 0)──► collection_failure ─────────────────────┘
//! ```
//!
//! The controller is the only mutator of [`RunState`]. Stage failures are
//! recorded as error entries and never abort the run; every path ends in
//! `terminal` with an artifact on disk when the write succeeds.

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::error::{FlowError, Result};
use crate::pipeline::executor::{Attempt, StageExecutor};
use crate::pipeline::report::{
    Reporter, NO_DATA_SENTINEL, NO_MATCHES_SENTINEL, REPORT_FAILED_SENTINEL,
};
use crate::pipeline::validate::{validate_collection, validate_export, validate_matching};
use crate::traits::{
    analyst::Analyst,
    scraper::{ScrapeRequest, SiteScraper},
};
use crate::types::{
    config::FlowConfig,
    record::mean_confidence,
    state::{CollectionResult, Phase, RunState},
};

/// Where a run goes once collection has finished.
pub fn route_after_collection(total_records: usize) -> Phase {
    if total_records > 0 {
        Phase::ProductMatching
    } else {
        Phase::CollectionFailure
    }
}

/// Drives one run through collection, matching and export.
pub struct FlowController<S, A> {
    config: FlowConfig,
    scraper: S,
    analyst: A,
    executor: StageExecutor,
    reporter: Reporter,
    state: RunState,
}

impl<S, A> FlowController<S, A>
where
    S: SiteScraper,
    A: Analyst,
{
    /// Create a controller for a fresh run.
    pub fn new(config: FlowConfig, scraper: S, analyst: A) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            executor: StageExecutor::new().with_timeout(config.unit_timeout()),
            reporter: Reporter::new(config.output_path.clone()),
            config,
            scraper,
            analyst,
            state: RunState::new(),
        })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn into_state(self) -> RunState {
        self.state
    }

    /// Run every remaining state until `terminal`.
    pub async fn run(mut self) -> Result<RunState> {
        info!(
            run_id = %self.state.run_id,
            sites = self.config.sites.len(),
            "Starting market flow"
        );

        while !self.state.phase.is_terminal() {
            self.step().await?;
        }

        info!(
            run_id = %self.state.run_id,
            success = self.state.flow_success,
            errors = self.state.errors.len(),
            "Market flow finished"
        );
        Ok(self.state)
    }

    /// Execute the current state and take exactly one transition.
    pub async fn step(&mut self) -> Result<Phase> {
        let next = match self.state.phase {
            Phase::Initialization => Phase::DataCollection,
            Phase::DataCollection => {
                self.collect().await;
                route_after_collection(self.state.total_records)
            }
            Phase::ProductMatching => {
                self.match_products().await;
                Phase::CsvGeneration
            }
            Phase::CsvGeneration => {
                self.generate_csv().await;
                Phase::Terminal
            }
            Phase::CollectionFailure => {
                self.handle_collection_failure().await;
                Phase::Terminal
            }
            Phase::Terminal => return Err(FlowError::AlreadyTerminal),
        };

        self.transition(next);
        Ok(next)
    }

    fn transition(&mut self, next: Phase) {
        info!(
            run_id = %self.state.run_id,
            from = %self.state.phase,
            to = %next,
            "Phase transition"
        );
        self.state.phase = next;

        if next.is_terminal() {
            self.state.finished_at = Some(chrono::Utc::now());
            self.state.summary = Some(self.reporter.summarize(&self.state));
        }
    }

    /// Scrape every configured site and keep what validates.
    async fn collect(&mut self) {
        // URLs were checked by `FlowConfig::validate` in `new`.
        let max_products = self.config.max_products_per_site;
        let requests: Vec<ScrapeRequest> = self
            .config
            .sites
            .iter()
            .filter_map(|site| {
                let url = site.markets_url().ok()?;
                Some(ScrapeRequest::new(&site.name, url.as_str(), max_products))
            })
            .collect();

        // `buffered` yields in request order, so results line up with the config.
        let attempts: Vec<Attempt> = {
            let executor = &self.executor;
            let scraper = &self.scraper;
            stream::iter(requests.iter())
                .map(|request| executor.collect(scraper, request))
                .buffered(self.config.collection_concurrency)
                .collect()
                .await
        };

        for attempt in attempts {
            let result = self.absorb_collection(attempt);
            self.state.total_records += result.record_count();
            self.state.collection_results.push(result);
        }

        info!(
            sites = self.state.collection_results.len(),
            succeeded = self.state.successful_sites(),
            records = self.state.total_records,
            "Data collection complete"
        );
    }

    fn absorb_collection(&mut self, attempt: Attempt) -> CollectionResult {
        let site = attempt.unit;

        let output = match attempt.result {
            Ok(output) => output,
            Err(e) => {
                self.state
                    .record_error(Phase::DataCollection, format!("{}: {}", site, e));
                return CollectionResult {
                    site,
                    raw_output: String::new(),
                    success: false,
                    records: Vec::new(),
                    error: Some(e.to_string()),
                };
            }
        };

        match validate_collection(&output) {
            Ok(batch) => {
                info!(site = %site, records = batch.products_count, "Site collected");
                CollectionResult {
                    site,
                    raw_output: output,
                    success: true,
                    records: batch.products,
                    error: None,
                }
            }
            Err(e) => {
                self.state
                    .record_error(Phase::DataCollection, format!("{}: {}", site, e));
                CollectionResult {
                    site,
                    raw_output: output,
                    success: false,
                    records: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// One matching pass over every collected record.
    async fn match_products(&mut self) {
        let working_set = self.state.working_set();
        if working_set.is_empty() {
            info!("Nothing to match, skipping analyst");
            self.state.nothing_to_match = true;
            return;
        }

        info!(records = working_set.len(), "Matching products across sites");
        let attempt = self
            .executor
            .match_products(&self.analyst, &working_set)
            .await;

        let output = match attempt.result {
            Ok(output) => output,
            Err(e) => {
                self.state
                    .record_error(Phase::ProductMatching, format!("Matching call failed: {}", e));
                return;
            }
        };

        match validate_matching(&output) {
            Ok(set) => {
                self.state.match_confidence = mean_confidence(&set.matched_products);
                self.state.unique_groups = set.total_unique_products;
                self.state.matched_groups = set.matched_products;
                info!(
                    groups = self.state.unique_groups,
                    confidence = self.state.match_confidence,
                    "Products matched"
                );
            }
            Err(e) => {
                self.state.record_error(
                    Phase::ProductMatching,
                    format!("Matching output rejected: {}", e),
                );
            }
        }
    }

    /// One export pass; persists the report or a placeholder.
    async fn generate_csv(&mut self) {
        if self.state.matched_groups.is_empty() {
            warn!("No matched products to export");
            self.state
                .record_error(Phase::CsvGeneration, "No matched products to export");
            self.write_placeholder(Phase::CsvGeneration, NO_MATCHES_SENTINEL)
                .await;
            return;
        }

        let attempt = self
            .executor
            .export(&self.analyst, &self.state.matched_groups)
            .await;

        let output = match attempt.result {
            Ok(output) => output,
            Err(e) => {
                self.state
                    .record_error(Phase::CsvGeneration, format!("Export call failed: {}", e));
                self.write_placeholder(Phase::CsvGeneration, REPORT_FAILED_SENTINEL)
                    .await;
                return;
            }
        };

        let artifact = match validate_export(&output) {
            Ok(artifact) => artifact,
            Err(e) => {
                self.state.record_error(
                    Phase::CsvGeneration,
                    format!("Export output rejected: {}", e),
                );
                self.write_placeholder(Phase::CsvGeneration, REPORT_FAILED_SENTINEL)
                    .await;
                return;
            }
        };

        let cleaned = Reporter::clean_artifact(&artifact.csv_content);
        match self.reporter.persist(&cleaned).await {
            Ok(path) => {
                self.state.artifact_path = Some(path);
                self.state.flow_success = true;
            }
            Err(e) => {
                self.state.record_error(Phase::CsvGeneration, e.to_string());
            }
        }
        self.state.artifact = Some(cleaned);
    }

    async fn handle_collection_failure(&mut self) {
        warn!("No records collected from any site");
        self.state.record_error(
            Phase::CollectionFailure,
            "No records collected from any site",
        );
        self.write_placeholder(Phase::CollectionFailure, NO_DATA_SENTINEL)
            .await;
        self.state.flow_success = false;
    }

    async fn write_placeholder(&mut self, phase: Phase, sentinel: &str) {
        let text = Reporter::placeholder_artifact(sentinel, chrono::Utc::now());
        match self.reporter.persist(&text).await {
            Ok(path) => self.state.artifact_path = Some(path),
            Err(e) => self.state.record_error(phase, e.to_string()),
        }
        self.state.artifact = Some(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAnalyst, MockScraper};
    use crate::types::config::SiteConfig;

    fn config(dir: &tempfile::TempDir) -> FlowConfig {
        FlowConfig::new()
            .with_sites([
                SiteConfig::new("polymarket", "https://polymarket.com"),
                SiteConfig::new("kalshi", "https://kalshi.com"),
            ])
            .with_output_path(dir.path().join("unified_products.csv"))
    }

    #[test]
    fn test_route_after_collection() {
        assert_eq!(route_after_collection(0), Phase::CollectionFailure);
        assert_eq!(route_after_collection(1), Phase::ProductMatching);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let result = FlowController::new(
            FlowConfig::new().with_sites(Vec::<SiteConfig>::new()),
            MockScraper::new(),
            MockAnalyst::new(),
        );
        assert!(matches!(result, Err(FlowError::Config(_))));
    }

    #[tokio::test]
    async fn test_step_walks_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let scraper = MockScraper::new()
            .with_products("polymarket", &[("Fed cut", "0.41")])
            .with_products("kalshi", &[("Fed cut", "0.44")]);
        let mut controller =
            FlowController::new(config(&dir), scraper, MockAnalyst::new()).unwrap();

        assert_eq!(controller.step().await.unwrap(), Phase::DataCollection);
        assert_eq!(controller.step().await.unwrap(), Phase::ProductMatching);
        assert_eq!(controller.state().total_records, 2);
        assert_eq!(controller.step().await.unwrap(), Phase::CsvGeneration);
        assert_eq!(controller.state().unique_groups, 1);
        assert_eq!(controller.step().await.unwrap(), Phase::Terminal);
        assert!(controller.state().flow_success);
        assert!(controller.state().summary.is_some());

        assert!(matches!(
            controller.step().await,
            Err(FlowError::AlreadyTerminal)
        ));
    }

    #[tokio::test]
    async fn test_collection_failure_branch_skips_matching() {
        let dir = tempfile::tempdir().unwrap();
        let analyst = MockAnalyst::new();
        let scraper = MockScraper::new()
            .with_failure("polymarket", "refused")
            .with_output("kalshi", "<html>not json</html>");

        let state = FlowController::new(config(&dir), scraper, analyst.clone())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(state.phase, Phase::Terminal);
        assert!(!state.flow_success);
        assert_eq!(analyst.matching_calls(), 0);
        assert_eq!(analyst.export_calls(), 0);
        assert!(state
            .errors
            .iter()
            .any(|e| e.phase == Phase::CollectionFailure));
    }

    #[tokio::test]
    async fn test_matching_failure_still_reaches_export_stage() {
        let dir = tempfile::tempdir().unwrap();
        let analyst = MockAnalyst::new().with_matching_failure("llm down");
        let scraper = MockScraper::new()
            .with_products("polymarket", &[("A", "1")])
            .with_products("kalshi", &[("B", "2")]);

        let state = FlowController::new(config(&dir), scraper, analyst.clone())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(state.phase, Phase::Terminal);
        assert!(!state.flow_success);
        assert_eq!(state.match_confidence, 0.0);
        assert_eq!(analyst.export_calls(), 0);
        assert!(state.errors.iter().any(|e| e.phase == Phase::ProductMatching));
        assert!(state.errors.iter().any(|e| e.phase == Phase::CsvGeneration));
    }

    #[tokio::test]
    async fn test_export_rejection_writes_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let analyst = MockAnalyst::new().with_export_output("sorry, I cannot do that");
        let scraper = MockScraper::new().with_products("polymarket", &[("A", "1")]);

        let state = FlowController::new(config(&dir), scraper, analyst)
            .unwrap()
            .run()
            .await
            .unwrap();

        assert!(!state.flow_success);
        let artifact = state.artifact.unwrap();
        assert!(artifact.contains(REPORT_FAILED_SENTINEL));
        assert!(state.artifact_path.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_collection_keeps_config_order() {
        let dir = tempfile::tempdir().unwrap();
        let scraper = MockScraper::new()
            .with_products("polymarket", &[("A", "1")])
            .with_products("kalshi", &[("B", "2")]);

        let state = FlowController::new(
            config(&dir).with_concurrency(4),
            scraper,
            MockAnalyst::new(),
        )
        .unwrap()
        .run()
        .await
        .unwrap();

        let sites: Vec<&str> = state
            .collection_results
            .iter()
            .map(|r| r.site.as_str())
            .collect();
        assert_eq!(sites, ["polymarket", "kalshi"]);
        assert!(state.flow_success);
    }

    #[tokio::test]
    async fn test_failed_sites_keep_their_config_position() {
        let dir = tempfile::tempdir().unwrap();
        let scraper = MockScraper::new()
            .with_failure("polymarket", "connection refused")
            .with_output("kalshi", "not json")
            .with_products("manifold", &[("C", "0.3")]);
        let config = FlowConfig::new()
            .with_sites([
                SiteConfig::new("polymarket", "https://polymarket.com"),
                SiteConfig::new("kalshi", "https://kalshi.com"),
                SiteConfig::new("manifold", "https://manifold.markets"),
            ])
            .with_output_path(dir.path().join("unified_products.csv"))
            .with_concurrency(3);

        let state = FlowController::new(config, scraper, MockAnalyst::new())
            .unwrap()
            .run()
            .await
            .unwrap();

        let outcomes: Vec<(&str, bool)> = state
            .collection_results
            .iter()
            .map(|r| (r.site.as_str(), r.success))
            .collect();
        assert_eq!(
            outcomes,
            [("polymarket", false), ("kalshi", false), ("manifold", true)]
        );
        assert_eq!(state.total_records, 1);
    }
}

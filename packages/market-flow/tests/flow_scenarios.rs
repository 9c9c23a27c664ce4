//! End-to-end flow scenarios using mock collaborators.
//!
//! Run with: cargo test -p market-flow --test flow_scenarios

use std::time::Duration;

use market_flow::pipeline::{NO_DATA_SENTINEL, NO_MATCHES_SENTINEL, REPORT_COLUMNS};
use market_flow::testing::{site_payload, MockAnalyst, MockScraper};
use market_flow::{FlowConfig, FlowController, Phase, Reporter, SiteConfig};
use serde_json::json;
use tempfile::TempDir;

fn three_sites(dir: &TempDir) -> FlowConfig {
    FlowConfig::new()
        .with_sites([
            SiteConfig::new("polymarket", "https://polymarket.com"),
            SiteConfig::new("kalshi", "https://kalshi.com"),
            SiteConfig::new("prediction-market", "https://www.prediction-market.com"),
        ])
        .with_output_path(dir.path().join("out/unified_products.csv"))
}

fn read_artifact(dir: &TempDir) -> String {
    std::fs::read_to_string(dir.path().join("out/unified_products.csv")).unwrap()
}

#[tokio::test]
async fn test_unparseable_site_is_recorded_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let analyst = MockAnalyst::new();
    let scraper = MockScraper::new()
        .with_products("polymarket", &[("Will the Fed cut rates in March?", "0.41")])
        .with_products("kalshi", &[("Fed rate cut in March", "0.44")])
        .with_output("prediction-market", "Sorry, the page could not be loaded.");

    let state = FlowController::new(three_sites(&dir), scraper, analyst.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(state.total_records, 2);
    assert_eq!(state.errors.len(), 1);
    assert_eq!(state.errors[0].phase, Phase::DataCollection);
    assert!(state.errors[0].message.starts_with("prediction-market"));

    let inputs = analyst.matching_inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].len(), 2);

    assert!(state.flow_success);
    assert_eq!(state.phase, Phase::Terminal);
}

#[tokio::test]
async fn test_all_empty_sites_write_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let analyst = MockAnalyst::new();
    let scraper = MockScraper::new()
        .with_output("polymarket", site_payload("polymarket", vec![]))
        .with_output("kalshi", site_payload("kalshi", vec![]))
        .with_output("prediction-market", site_payload("prediction-market", vec![]));

    let state = FlowController::new(three_sites(&dir), scraper, analyst.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(state.total_records, 0);
    assert!(!state.flow_success);
    assert_eq!(analyst.matching_calls(), 0);

    let artifact = read_artifact(&dir);
    let lines: Vec<&str> = artifact.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], REPORT_COLUMNS.join(","));

    let row: Vec<&str> = lines[1].split(',').collect();
    let confidence_idx = REPORT_COLUMNS
        .iter()
        .position(|c| *c == "confidence_level")
        .unwrap();
    assert_eq!(row[0], NO_DATA_SENTINEL);
    assert_eq!(row[confidence_idx], "0.0");
}

#[tokio::test]
async fn test_group_confidence_defaults_to_member_mean() {
    let dir = tempfile::tempdir().unwrap();
    let matching = json!({
        "matched_products": [{
            "unified_title": "Fed cuts rates in March",
            "products": [
                {"title": "Will the Fed cut rates in March?", "site": "polymarket", "confidence_score": 0.6},
                {"title": "Fed rate cut in March", "site": "kalshi", "confidence_score": 0.8}
            ]
        }],
        "total_unique_products": 1
    });
    let analyst = MockAnalyst::new().with_matching_output(matching.to_string());
    let scraper = MockScraper::new()
        .with_products("polymarket", &[("Will the Fed cut rates in March?", "0.41")])
        .with_products("kalshi", &[("Fed rate cut in March", "0.44")])
        .with_failure("prediction-market", "connection refused");

    let state = FlowController::new(three_sites(&dir), scraper, analyst)
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(state.matched_groups.len(), 1);
    assert!((state.matched_groups[0].match_confidence - 0.7).abs() < 1e-9);
    assert!((state.match_confidence - 0.7).abs() < 1e-9);
    assert_eq!(state.matched_groups[0].sites.len(), 2);
    assert!(state.flow_success);
}

#[tokio::test]
async fn test_zero_groups_still_reach_export_stage() {
    let dir = tempfile::tempdir().unwrap();
    let analyst = MockAnalyst::new()
        .with_matching_output(r#"{"matched_products": [], "total_unique_products": 0}"#);
    let scraper = MockScraper::new().with_products("kalshi", &[("Fed rate cut in March", "0.44")]);

    let state = FlowController::new(three_sites(&dir), scraper, analyst.clone())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(state.phase, Phase::Terminal);
    assert!(!state.flow_success);
    assert_eq!(state.match_confidence, 0.0);
    assert_eq!(analyst.export_calls(), 0);
    assert!(state.errors.iter().any(|e| e.phase == Phase::CsvGeneration));
    assert!(read_artifact(&dir).contains(NO_MATCHES_SENTINEL));
}

#[tokio::test]
async fn test_happy_path_writes_clean_csv() {
    let dir = tempfile::tempdir().unwrap();
    let scraper = MockScraper::new()
        .with_products("polymarket", &[("Fed cut", "0.41"), ("BTC above 100k", "0.30")])
        .with_products("kalshi", &[("Fed cut", "0.44")])
        .with_products("prediction-market", &[("BTC above 100k", "0.35")]);

    let state = FlowController::new(three_sites(&dir), scraper, MockAnalyst::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(state.flow_success);
    assert!(state.errors.is_empty());
    assert_eq!(state.unique_groups, 2);

    let artifact = read_artifact(&dir);
    assert!(!artifact.contains("```"));
    assert!(artifact.starts_with("unified_title,"));

    let summary = state.summary.as_ref().unwrap();
    assert_eq!(summary.sites_succeeded, 3);
    assert_eq!(summary.row_count, 2);
    assert_eq!(summary.phase, Phase::Terminal);

    let status = Reporter::render_status(&state);
    assert!(status.contains("STATUS: SUCCESS"));
}

#[tokio::test]
async fn test_unwritable_output_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    // The output path is an existing directory.
    let config = three_sites(&dir).with_output_path(dir.path());
    let scraper = MockScraper::new().with_products("kalshi", &[("Fed cut", "0.44")]);

    let state = FlowController::new(config, scraper, MockAnalyst::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(state.phase, Phase::Terminal);
    assert!(!state.flow_success);
    assert!(state.artifact_path.is_none());
    assert!(state.errors.iter().any(|e| e.phase == Phase::CsvGeneration));
}

#[tokio::test]
async fn test_panicking_and_slow_sites_do_not_abort_run() {
    let dir = tempfile::tempdir().unwrap();
    let slow = MockScraper::new()
        .with_output("kalshi", site_payload("kalshi", vec![]))
        .with_delay(Duration::from_secs(2));
    let config = FlowConfig::new()
        .with_sites([SiteConfig::new("kalshi", "https://kalshi.com")])
        .with_output_path(dir.path().join("out/unified_products.csv"))
        .with_unit_timeout(Duration::from_millis(300));

    let state = FlowController::new(config, slow, MockAnalyst::new())
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(state.errors[0].message, "kalshi: timed out after 300ms");
    assert!(read_artifact(&dir).contains(NO_DATA_SENTINEL));

    let panicky = MockScraper::new()
        .with_panic("polymarket")
        .with_products("kalshi", &[("Fed cut", "0.44")]);
    let state = FlowController::new(three_sites(&dir), panicky, MockAnalyst::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(state.flow_success);
    assert!(state
        .errors
        .iter()
        .any(|e| e.message.contains("panicked")));
}

#[tokio::test]
async fn test_subsecond_unit_timeout_lets_fast_sites_through() {
    let dir = tempfile::tempdir().unwrap();
    let scraper = MockScraper::new()
        .with_products("polymarket", &[("Fed cut", "0.41")])
        .with_products("kalshi", &[("Fed cut", "0.44")])
        .with_products("prediction-market", &[("Fed cut", "0.40")])
        .with_delay(Duration::from_millis(50));
    let config = three_sites(&dir).with_unit_timeout(Duration::from_millis(500));

    let state = FlowController::new(config, scraper, MockAnalyst::new())
        .unwrap()
        .run()
        .await
        .unwrap();

    assert!(state.flow_success);
    assert_eq!(state.total_records, 3);
    assert!(state.errors.iter().all(|e| !e.message.contains("timed out")));
}

#[tokio::test]
async fn test_concurrent_collection_matches_sequential() {
    let scraper = || {
        MockScraper::new()
            .with_products("polymarket", &[("Fed cut", "0.41")])
            .with_products("kalshi", &[("Fed cut", "0.44")])
            .with_products("prediction-market", &[("Fed cut", "0.40")])
            .with_delay(Duration::from_millis(50))
    };

    let dir = tempfile::tempdir().unwrap();
    let sequential = FlowController::new(three_sites(&dir), scraper(), MockAnalyst::new())
        .unwrap()
        .run()
        .await
        .unwrap();
    let concurrent = FlowController::new(
        three_sites(&dir).with_concurrency(3),
        scraper(),
        MockAnalyst::new(),
    )
    .unwrap()
    .run()
    .await
    .unwrap();

    let sites = |results: &[market_flow::CollectionResult]| {
        results.iter().map(|r| r.site.clone()).collect::<Vec<_>>()
    };
    assert_eq!(
        sites(&sequential.collection_results),
        sites(&concurrent.collection_results)
    );
    assert_eq!(sequential.total_records, concurrent.total_records);
    assert_eq!(sequential.unique_groups, concurrent.unique_groups);
}

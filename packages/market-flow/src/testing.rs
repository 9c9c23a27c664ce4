//! Testing utilities including mock collaborators.
//!
//! These are useful for testing applications that drive the flow without
//! making real network or LLM calls.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{CollaboratorError, CollaboratorResult};
use crate::pipeline::report::REPORT_COLUMNS;
use crate::traits::{
    analyst::Analyst,
    scraper::{ScrapeRequest, SiteScraper},
};
use crate::types::record::{MatchGroup, Record};

/// Canned behaviour for one mocked call.
#[derive(Debug, Clone)]
pub enum MockReply {
    Output(String),
    Failure(String),
    Panic,
}

impl MockReply {
    fn resolve(&self) -> CollaboratorResult<String> {
        match self {
            Self::Output(text) => Ok(text.clone()),
            Self::Failure(message) => Err(CollaboratorError::Http(Box::new(
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, message.clone()),
            ))),
            Self::Panic => panic!("mock collaborator panic"),
        }
    }
}

/// Build a site payload in the shape scrapers return.
pub fn site_payload(site: &str, products: Vec<Value>) -> String {
    json!({
        "site": site,
        "url": format!("https://{}.example/markets", site),
        "products_count": products.len(),
        "products": products,
        "timestamp": 0,
    })
    .to_string()
}

/// A mock scraper for testing.
///
/// Returns predefined output per site without making network requests.
/// Sites without canned output fail.
#[derive(Default, Clone)]
pub struct MockScraper {
    replies: Arc<RwLock<HashMap<String, MockReply>>>,
    delay: Option<Duration>,
    calls: Arc<RwLock<Vec<ScrapeRequest>>>,
}

impl MockScraper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `output` verbatim for `site`.
    pub fn with_output(self, site: impl Into<String>, output: impl Into<String>) -> Self {
        self.replies
            .write()
            .unwrap()
            .insert(site.into(), MockReply::Output(output.into()));
        self
    }

    /// Return a well-formed payload with one record per `(title, price)`.
    pub fn with_products(self, site: &str, products: &[(&str, &str)]) -> Self {
        let products = products
            .iter()
            .map(|(title, price)| json!({"title": title, "price": price, "site": site}))
            .collect();
        self.with_output(site, site_payload(site, products))
    }

    /// Fail `site` with a connection error.
    pub fn with_failure(self, site: impl Into<String>, message: impl Into<String>) -> Self {
        self.replies
            .write()
            .unwrap()
            .insert(site.into(), MockReply::Failure(message.into()));
        self
    }

    /// Panic when `site` is scraped.
    pub fn with_panic(self, site: impl Into<String>) -> Self {
        self.replies
            .write()
            .unwrap()
            .insert(site.into(), MockReply::Panic);
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Get all requests made to this mock.
    pub fn calls(&self) -> Vec<ScrapeRequest> {
        self.calls.read().unwrap().clone()
    }
}

#[async_trait]
impl SiteScraper for MockScraper {
    async fn scrape(&self, request: &ScrapeRequest) -> CollaboratorResult<String> {
        self.calls.write().unwrap().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.read().unwrap().get(&request.site).cloned();
        match reply {
            Some(reply) => reply.resolve(),
            None => Err(CollaboratorError::InvalidResponse(format!(
                "no canned output for {}",
                request.site
            ))),
        }
    }
}

/// Record of a call made to the mock analyst.
#[derive(Debug, Clone)]
pub enum MockAnalystCall {
    Match { records_json: String },
    Export { groups_json: String },
}

/// A mock analyst for testing.
///
/// Without canned replies it groups records by exact title and renders the
/// groups as a CSV report, so a happy-path flow needs no setup.
#[derive(Default, Clone)]
pub struct MockAnalyst {
    matching: Option<MockReply>,
    export: Option<MockReply>,
    calls: Arc<RwLock<Vec<MockAnalystCall>>>,
}

impl MockAnalyst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_matching_output(mut self, output: impl Into<String>) -> Self {
        self.matching = Some(MockReply::Output(output.into()));
        self
    }

    pub fn with_matching_failure(mut self, message: impl Into<String>) -> Self {
        self.matching = Some(MockReply::Failure(message.into()));
        self
    }

    pub fn with_export_output(mut self, output: impl Into<String>) -> Self {
        self.export = Some(MockReply::Output(output.into()));
        self
    }

    pub fn with_export_failure(mut self, message: impl Into<String>) -> Self {
        self.export = Some(MockReply::Failure(message.into()));
        self
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<MockAnalystCall> {
        self.calls.read().unwrap().clone()
    }

    /// Number of matching calls.
    pub fn matching_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockAnalystCall::Match { .. }))
            .count()
    }

    /// Number of export calls.
    pub fn export_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockAnalystCall::Export { .. }))
            .count()
    }

    /// Records sent to each matching call.
    pub fn matching_inputs(&self) -> Vec<Vec<Record>> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                MockAnalystCall::Match { records_json } => serde_json::from_str(records_json).ok(),
                _ => None,
            })
            .collect()
    }

    fn default_matching(records_json: &str) -> CollaboratorResult<String> {
        let records: Vec<Record> = serde_json::from_str(records_json)
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        let mut by_title: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        for record in records {
            by_title.entry(record.title.clone()).or_default().push(record);
        }

        let groups: Vec<Value> = by_title
            .into_iter()
            .map(|(title, products)| json!({"unified_title": title, "products": products}))
            .collect();

        Ok(json!({
            "total_unique_products": groups.len(),
            "matched_products": groups,
            "analysis_summary": "grouped by exact title",
        })
        .to_string())
    }

    fn default_export(groups_json: &str) -> CollaboratorResult<String> {
        let groups: Vec<MatchGroup> = serde_json::from_str(groups_json)
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        let mut csv = String::from("```csv\n");
        csv.push_str(&REPORT_COLUMNS.join(","));
        csv.push('\n');
        for group in &groups {
            let price_on = |site: &str| {
                group
                    .products
                    .iter()
                    .find(|p| p.site == site)
                    .map(|p| p.price.clone())
                    .unwrap_or_else(|| "N/A".to_string())
            };
            let category = group
                .products
                .first()
                .map(|p| p.category.clone())
                .unwrap_or_else(|| "N/A".to_string());
            let row = [
                group.unified_title.clone(),
                category,
                price_on("polymarket"),
                price_on("kalshi"),
                price_on("prediction-market"),
                "N/A".to_string(),
                group.sites.len().to_string(),
                format!("{:.2}", group.match_confidence),
                "N/A".to_string(),
                "N/A".to_string(),
            ];
            csv.push_str(&row.join(","));
            csv.push('\n');
        }
        csv.push_str("```");
        Ok(csv)
    }
}

#[async_trait]
impl Analyst for MockAnalyst {
    async fn match_products(&self, records_json: &str) -> CollaboratorResult<String> {
        self.calls.write().unwrap().push(MockAnalystCall::Match {
            records_json: records_json.to_string(),
        });

        match &self.matching {
            Some(reply) => reply.resolve(),
            None => Self::default_matching(records_json),
        }
    }

    async fn format_csv(&self, groups_json: &str) -> CollaboratorResult<String> {
        self.calls.write().unwrap().push(MockAnalystCall::Export {
            groups_json: groups_json.to_string(),
        });

        match &self.export {
            Some(reply) => reply.resolve(),
            None => Self::default_export(groups_json),
        }
    }
}

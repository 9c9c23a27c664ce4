//! Site scraper trait.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::CollaboratorResult;

/// One unit of collection work: a single site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrapeRequest {
    pub site: String,
    pub url: String,
    pub max_products: usize,
}

impl ScrapeRequest {
    pub fn new(site: impl Into<String>, url: impl Into<String>, max_products: usize) -> Self {
        Self {
            site: site.into(),
            url: url.into(),
            max_products,
        }
    }
}

/// Scraper trait for collecting market listings from one site.
///
/// The returned text should parse as
/// `{site, url, products_count, products[], timestamp}`. A scraper that
/// finds nothing may return the same shape with empty `products`; the
/// flow treats both that and an `Err` as a failed site.
#[async_trait]
pub trait SiteScraper: Send + Sync {
    async fn scrape(&self, request: &ScrapeRequest) -> CollaboratorResult<String>;
}

//! HTTP scraper - fetches a markets page and turns its headings into records.
//!
//! No JavaScript rendering, so heavily scripted sites yield few records.
//! Each heading longer than [`MIN_TITLE_CHARS`] becomes one record.

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{CollaboratorError, CollaboratorResult};
use crate::traits::scraper::{ScrapeRequest, SiteScraper};

/// Headings this short are navigation noise.
pub const MIN_TITLE_CHARS: usize = 5;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Scraper using plain HTTP and heading extraction.
pub struct HttpScraper {
    client: reqwest::Client,
    heading: Regex,
    tag: Regex,
    whitespace: Regex,
}

impl HttpScraper {
    /// Create a scraper with the default user agent and a 30s timeout.
    pub fn new() -> CollaboratorResult<Self> {
        Self::with_options(DEFAULT_USER_AGENT, Duration::from_secs(30))
    }

    pub fn with_options(user_agent: &str, timeout: Duration) -> CollaboratorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| CollaboratorError::Http(Box::new(e)))?;

        Ok(Self {
            client,
            heading: compile(r"(?is)<h([1-4])(?:\s[^>]*)?>(.*?)</h[1-4]\s*>")?,
            tag: compile(r"(?s)<[^>]*>")?,
            whitespace: compile(r"\s+")?,
        })
    }

    async fn fetch_html(&self, url: &str) -> CollaboratorResult<String> {
        let response = self.client.get(url).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "HTTP request failed");
            CollaboratorError::Http(Box::new(e))
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Http(Box::new(std::io::Error::other(
                format!("HTTP {} for {}", status, url),
            ))));
        }

        response
            .text()
            .await
            .map_err(|e| CollaboratorError::Http(Box::new(e)))
    }

    /// Distinct heading texts in document order.
    pub fn extract_headings(&self, html: &str, limit: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut titles = Vec::new();

        for captures in self.heading.captures_iter(html) {
            if titles.len() >= limit {
                break;
            }
            let Some(inner) = captures.get(2) else {
                continue;
            };

            let text = self.tag.replace_all(inner.as_str(), " ");
            let text = decode_entities(&text);
            let text = self.whitespace.replace_all(text.trim(), " ").into_owned();

            if text.chars().count() > MIN_TITLE_CHARS && seen.insert(text.clone()) {
                titles.push(text);
            }
        }

        titles
    }
}

#[async_trait]
impl SiteScraper for HttpScraper {
    async fn scrape(&self, request: &ScrapeRequest) -> CollaboratorResult<String> {
        debug!(site = %request.site, url = %request.url, "Fetching markets page");
        let html = self.fetch_html(&request.url).await?;

        let products: Vec<_> = self
            .extract_headings(&html, request.max_products)
            .into_iter()
            .map(|title| {
                json!({
                    "title": title,
                    "price": "Unknown",
                    "category": "Market",
                    "volume": "",
                    "url": request.url,
                    "site": request.site,
                    "confidence_score": 0.4,
                })
            })
            .collect();

        info!(site = %request.site, products = products.len(), "Scraped markets page");

        let payload = json!({
            "site": request.site,
            "url": request.url,
            "products_count": products.len(),
            "products": products,
            "method": "http_headings",
            "timestamp": chrono::Utc::now().timestamp(),
        });
        serde_json::to_string_pretty(&payload)
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))
    }
}

fn compile(pattern: &str) -> CollaboratorResult<Regex> {
    Regex::new(pattern).map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

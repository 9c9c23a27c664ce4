//! Rate-limited scraper wrapper.
//!
//! Wraps any SiteScraper with a politeness limit using the governor crate.

use async_trait::async_trait;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;

use crate::error::CollaboratorResult;
use crate::traits::scraper::{ScrapeRequest, SiteScraper};

type DefaultRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// A scraper wrapper that enforces a request rate across all sites.
pub struct RateLimitedScraper<S: SiteScraper> {
    inner: S,
    limiter: Arc<DefaultRateLimiter>,
}

impl<S: SiteScraper> RateLimitedScraper<S> {
    /// Allow `requests_per_second` scrapes (zero is treated as one).
    pub fn new(scraper: S, requests_per_second: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self::with_quota(scraper, Quota::per_second(rate))
    }

    pub fn with_quota(scraper: S, quota: Quota) -> Self {
        Self {
            inner: scraper,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: SiteScraper> SiteScraper for RateLimitedScraper<S> {
    async fn scrape(&self, request: &ScrapeRequest) -> CollaboratorResult<String> {
        self.limiter.until_ready().await;
        self.inner.scrape(request).await
    }
}

/// Extension trait for easy rate limiting.
pub trait ScraperExt: SiteScraper + Sized {
    /// Wrap this scraper with rate limiting.
    fn rate_limited(self, requests_per_second: u32) -> RateLimitedScraper<Self> {
        RateLimitedScraper::new(self, requests_per_second)
    }
}

impl<S: SiteScraper + Sized> ScraperExt for S {}

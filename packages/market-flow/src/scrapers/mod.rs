//! Scraper implementations.
//!
//! - `HttpScraper` - plain HTTP fetch with heading extraction
//! - `RateLimitedScraper` - wrapper that spaces requests out

pub mod http;
pub mod rate_limited;

pub use http::HttpScraper;
pub use rate_limited::{RateLimitedScraper, ScraperExt};

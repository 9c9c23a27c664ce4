//! Configuration types for the flow and its target sites.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{FlowError, Result};

/// A prediction-market site to collect from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Site identifier (e.g., "polymarket")
    pub name: String,

    /// Base URL (e.g., "https://polymarket.com")
    pub base_url: String,

    /// Path of the markets listing, joined onto `base_url`
    #[serde(default = "default_markets_endpoint")]
    pub markets_endpoint: String,
}

fn default_markets_endpoint() -> String {
    "/markets".to_string()
}

impl SiteConfig {
    /// Create a site with the default `/markets` endpoint.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            markets_endpoint: default_markets_endpoint(),
        }
    }

    /// Set the markets endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.markets_endpoint = endpoint.into();
        self
    }

    /// Full URL of the markets listing.
    pub fn markets_url(&self) -> Result<Url> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| FlowError::Config(format!("invalid base_url for {}: {}", self.name, e)))?;
        base.join(&self.markets_endpoint).map_err(|e| {
            FlowError::Config(format!("invalid markets_endpoint for {}: {}", self.name, e))
        })
    }
}

/// Configuration for a single flow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Sites to collect from, in the order they are attempted.
    pub sites: Vec<SiteConfig>,

    /// Maximum records requested from each site.
    ///
    /// Default: 50.
    pub max_products_per_site: usize,

    /// Where the CSV (or placeholder) artifact is written.
    pub output_path: PathBuf,

    /// How many sites may be collected at once.
    ///
    /// 1 keeps collection strictly sequential. Default: 1.
    pub collection_concurrency: usize,

    /// Upper bound on a single collaborator call, in milliseconds.
    ///
    /// `None` leaves timeouts to the collaborator itself.
    #[serde(default)]
    pub unit_timeout_ms: Option<u64>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            sites: default_sites(),
            max_products_per_site: 50,
            output_path: PathBuf::from("./output/unified_products.csv"),
            collection_concurrency: 1,
            unit_timeout_ms: None,
        }
    }
}

/// The prediction-market sites collected from out of the box.
pub fn default_sites() -> Vec<SiteConfig> {
    vec![
        SiteConfig::new("polymarket", "https://polymarket.com"),
        SiteConfig::new("kalshi", "https://kalshi.com"),
        SiteConfig::new("prediction-market", "https://www.prediction-market.com"),
    ]
}

impl FlowConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the site list.
    pub fn with_sites(mut self, sites: impl IntoIterator<Item = SiteConfig>) -> Self {
        self.sites = sites.into_iter().collect();
        self
    }

    /// Set the artifact path.
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    /// Set max records per site.
    pub fn with_max_products(mut self, max: usize) -> Self {
        self.max_products_per_site = max;
        self
    }

    /// Set collection concurrency.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.collection_concurrency = concurrency;
        self
    }

    /// Set the per-unit timeout, at millisecond precision.
    pub fn with_unit_timeout(mut self, timeout: Duration) -> Self {
        self.unit_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Per-unit timeout as a `Duration`.
    pub fn unit_timeout(&self) -> Option<Duration> {
        self.unit_timeout_ms.map(Duration::from_millis)
    }

    /// Check the config before a run.
    pub fn validate(&self) -> Result<()> {
        if self.sites.is_empty() {
            return Err(FlowError::Config("no sites configured".into()));
        }
        if self.collection_concurrency == 0 {
            return Err(FlowError::Config(
                "collection_concurrency must be > 0".into(),
            ));
        }
        if self.max_products_per_site == 0 {
            return Err(FlowError::Config(
                "max_products_per_site must be > 0".into(),
            ));
        }
        if self.unit_timeout_ms == Some(0) {
            return Err(FlowError::Config(
                "unit_timeout must be at least 1ms".into(),
            ));
        }

        let mut seen = HashSet::new();
        for site in &self.sites {
            if !seen.insert(site.name.as_str()) {
                return Err(FlowError::Config(format!(
                    "duplicate site name: {}",
                    site.name
                )));
            }
            site.markets_url()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sites() {
        let config = FlowConfig::default();
        let names: Vec<_> = config.sites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["polymarket", "kalshi", "prediction-market"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_markets_url_joins_endpoint() {
        let site = SiteConfig::new("kalshi", "https://kalshi.com");
        assert_eq!(
            site.markets_url().unwrap().as_str(),
            "https://kalshi.com/markets"
        );
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let config = FlowConfig::new().with_sites([
            SiteConfig::new("a", "https://a.com"),
            SiteConfig::new("a", "https://b.com"),
        ]);
        assert!(matches!(config.validate(), Err(FlowError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = FlowConfig::new().with_sites([SiteConfig::new("a", "not a url")]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = FlowConfig::new().with_concurrency(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unit_timeout_keeps_subsecond_precision() {
        let config = FlowConfig::new().with_unit_timeout(Duration::from_millis(1500));
        assert_eq!(config.unit_timeout(), Some(Duration::from_millis(1500)));

        let config = FlowConfig::new().with_unit_timeout(Duration::from_millis(200));
        assert_eq!(config.unit_timeout(), Some(Duration::from_millis(200)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_unit_timeout() {
        let config = FlowConfig::new().with_unit_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(FlowError::Config(_))));

        // Below one millisecond truncates to zero
        let config = FlowConfig::new().with_unit_timeout(Duration::from_micros(400));
        assert!(matches!(config.validate(), Err(FlowError::Config(_))));
    }

    #[test]
    fn test_unit_timeout_deserializes_as_millis() {
        let config: FlowConfig = serde_json::from_str(
            r#"{"sites":[{"name":"x","base_url":"https://x.io"}],"max_products_per_site":5,
                "output_path":"out.csv","collection_concurrency":1,"unit_timeout_ms":750}"#,
        )
        .unwrap();
        assert_eq!(config.unit_timeout(), Some(Duration::from_millis(750)));
    }

    #[test]
    fn test_sites_deserialize_with_default_endpoint() {
        let sites: Vec<SiteConfig> =
            serde_json::from_str(r#"[{"name":"x","base_url":"https://x.io"}]"#).unwrap();
        assert_eq!(sites[0].markets_endpoint, "/markets");
    }
}

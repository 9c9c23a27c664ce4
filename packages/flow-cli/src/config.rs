//! Application configuration loaded from the environment.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use market_flow::security::{LlmCredentials, SecretString, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};
use market_flow::{default_sites, FlowConfig, SiteConfig};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Settings for the binary. The API key is only required by `run` and `check`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: Option<SecretString>,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub output_dir: PathBuf,
    pub csv_output_path: PathBuf,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub user_agent: String,
    pub log_level: String,
}

impl AppConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let output_dir = PathBuf::from(get("OUTPUT_DIR").unwrap_or_else(|| "./output".into()));
        let csv_output_path = get("CSV_OUTPUT_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| output_dir.join("unified_products.csv"));

        Ok(Self {
            api_key: get("MISTRAL_API_KEY").map(SecretString::from),
            model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.into()),
            base_url: get("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_LLM_BASE_URL.into()),
            temperature: parse_or(get("LLM_TEMPERATURE"), "LLM_TEMPERATURE", 0.1)?,
            max_tokens: parse_or(get("LLM_MAX_TOKENS"), "LLM_MAX_TOKENS", 4000)?,
            output_dir,
            csv_output_path,
            request_timeout: Duration::from_secs(parse_or(
                get("REQUEST_TIMEOUT"),
                "REQUEST_TIMEOUT",
                30,
            )?),
            max_retries: parse_or(get("MAX_RETRIES"), "MAX_RETRIES", 3)?,
            user_agent: get("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.into()),
            log_level: get("LOG_LEVEL")
                .unwrap_or_else(|| "info".into())
                .to_lowercase(),
        })
    }

    /// LLM credentials; fails when no API key is configured.
    pub fn credentials(&self) -> Result<LlmCredentials> {
        let api_key = self
            .api_key
            .as_ref()
            .context("MISTRAL_API_KEY must be set")?;

        Ok(LlmCredentials::new(api_key.expose())
            .with_model(self.model.clone())
            .with_base_url(self.base_url.clone())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens))
    }

    /// Flow config from the environment, an optional site file and overrides.
    pub fn flow_config(&self, sites_file: Option<&Path>) -> Result<FlowConfig> {
        let sites = match sites_file {
            Some(path) => load_sites(path)?,
            None => default_sites(),
        };

        Ok(FlowConfig::new()
            .with_sites(sites)
            .with_output_path(self.csv_output_path.clone()))
    }

    /// Create the output directory if it does not exist.
    pub fn ensure_output_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.output_dir.display()
            )
        })
    }
}

/// Read a JSON array of sites.
pub fn load_sites(path: &Path) -> Result<Vec<SiteConfig>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read sites file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Sites file {} is not a JSON list of sites", path.display()))
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => v
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}

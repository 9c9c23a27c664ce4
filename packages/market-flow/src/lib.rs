//! Cross-Site Prediction Market Flow
//!
//! Collects market listings from several prediction-market sites, asks an
//! analyst to group equivalent markets, and writes a unified CSV report.
//!
//! # Design Philosophy
//!
//! **"Never trust a collaborator"**
//!
//! - Every scraper and analyst output is validated before it is used
//! - Stage failures become error entries, never aborted runs
//! - Every run ends in `terminal` with an artifact on disk
//! - Library handles mechanics, collaborators handle semantics
//!
//! # Usage
//!
//! ```rust,ignore
//! use market_flow::{FlowConfig, FlowController, Reporter};
//! use market_flow::testing::{MockAnalyst, MockScraper};
//!
//! let scraper = MockScraper::new().with_products("kalshi", &[("Fed cut", "0.44")]);
//! let controller = FlowController::new(FlowConfig::default(), scraper, MockAnalyst::new())?;
//!
//! let state = controller.run().await?;
//! println!("{}", Reporter::render_status(&state));
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator abstractions (SiteScraper, Analyst)
//! - [`types`] - Records, groups, run state and config
//! - [`pipeline`] - Validation, execution, control flow and reporting
//! - [`scrapers`] - Scraper implementations (HttpScraper, RateLimitedScraper)
//! - [`security`] - Credential handling
//! - [`testing`] - Mock collaborators for testing

pub mod error;
pub mod pipeline;
pub mod scrapers;
pub mod security;
pub mod testing;
pub mod traits;
pub mod types;

#[cfg(feature = "openai")]
pub mod ai;

// Re-export core types at crate root
pub use error::{CollaboratorError, FlowError, PersistError, Result, ValidationError};
pub use pipeline::{
    route_after_collection, Attempt, FlowController, Reporter, StageExecutor, StageKind,
};
pub use traits::{
    analyst::Analyst,
    scraper::{ScrapeRequest, SiteScraper},
};
pub use types::{
    config::{default_sites, FlowConfig, SiteConfig},
    record::{ExportArtifact, GeneralOutput, MatchGroup, MatchSet, Record, SiteBatch},
    state::{CollectionResult, ErrorEntry, Phase, RunState},
    summary::RunSummary,
};

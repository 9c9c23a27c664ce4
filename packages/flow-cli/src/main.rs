//! Command-line entry point for the prediction-market flow.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use market_flow::ai::LlmAnalyst;
use market_flow::pipeline::validate_general;
use market_flow::scrapers::{HttpScraper, ScraperExt};
use market_flow::{FlowController, Reporter, RunState};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

#[derive(Parser)]
#[command(name = "market-flow")]
#[command(about = "Collect, match and export prediction-market listings")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full collect → match → export flow
    Run {
        /// JSON file with the sites to collect from
        #[arg(long)]
        sites: Option<PathBuf>,

        /// Where to write the CSV report
        #[arg(long)]
        output: Option<PathBuf>,

        /// How many sites to collect at once
        #[arg(long, default_value_t = 1)]
        concurrency: usize,

        /// Print the run summary as JSON instead of the status report
        #[arg(long)]
        json: bool,
    },

    /// List the configured sites and their URLs
    Sites {
        #[arg(long)]
        sites: Option<PathBuf>,
    },

    /// Verify prerequisites and LLM connectivity
    Check,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Run {
            sites,
            output,
            concurrency,
            json,
        } => cmd_run(&config, sites, output, concurrency, json).await,
        Commands::Sites { sites } => cmd_sites(&config, sites),
        Commands::Check => cmd_check(&config).await,
    }
}

async fn cmd_run(
    config: &AppConfig,
    sites: Option<PathBuf>,
    output: Option<PathBuf>,
    concurrency: usize,
    json: bool,
) -> Result<ExitCode> {
    config.ensure_output_dir()?;

    let mut flow_config = config
        .flow_config(sites.as_deref())?
        .with_concurrency(concurrency);
    if let Some(path) = output {
        flow_config = flow_config.with_output_path(path);
    }

    let scraper = HttpScraper::with_options(&config.user_agent, config.request_timeout)
        .context("Failed to create HTTP scraper")?
        .rate_limited(1);
    let analyst = LlmAnalyst::new(config.credentials()?)
        .context("Failed to create LLM analyst")?
        .with_request_timeout(config.request_timeout)
        .context("Failed to create LLM analyst")?
        .with_max_retries(config.max_retries);

    tracing::info!(model = %analyst.model(), "Starting run");

    let controller = FlowController::new(flow_config, scraper, analyst)?;
    let state = controller.run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&state.summary)?);
    } else {
        print_status(&state);
    }

    Ok(if state.flow_success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_status(state: &RunState) {
    for line in Reporter::render_status(state).lines() {
        if line.starts_with("STATUS:") {
            if state.flow_success {
                println!("{}", line.bright_green().bold());
            } else {
                println!("{}", line.bright_yellow().bold());
            }
        } else if line.starts_with("- ") {
            println!("{}", line.red());
        } else {
            println!("{}", line);
        }
    }
}

fn cmd_sites(config: &AppConfig, sites: Option<PathBuf>) -> Result<ExitCode> {
    let flow_config = config.flow_config(sites.as_deref())?;

    for site in &flow_config.sites {
        match site.markets_url() {
            Ok(url) => println!("{:<20} {}", site.name.bright_cyan(), url),
            Err(e) => println!("{:<20} {}", site.name.bright_cyan(), e.to_string().red()),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_check(config: &AppConfig) -> Result<ExitCode> {
    let mut ok = true;

    match config.credentials() {
        Ok(credentials) => {
            println!("{} API key configured", "✓".green());

            let analyst = LlmAnalyst::new(credentials)
                .context("Failed to create LLM analyst")?
                .with_request_timeout(config.request_timeout)
                .context("Failed to create LLM analyst")?
                .with_max_retries(0);

            let verdict = analyst
                .ping()
                .await
                .map_err(|e| e.to_string())
                .and_then(|reply| {
                    validate_general(&reply, "connection_test").map_err(|e| e.to_string())
                });
            match verdict {
                Ok(reply) => {
                    println!("{} LLM reachable ({})", "✓".green(), analyst.model());
                    if let Some(warning) = reply.warning {
                        println!("  {}", warning.yellow());
                    }
                }
                Err(e) => {
                    println!("{} LLM connection failed: {}", "✗".red(), e);
                    ok = false;
                }
            }
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            ok = false;
        }
    }

    match config.ensure_output_dir() {
        Ok(()) => println!(
            "{} Output directory {}",
            "✓".green(),
            config.output_dir.display()
        ),
        Err(e) => {
            println!("{} {:#}", "✗".red(), e);
            ok = false;
        }
    }

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

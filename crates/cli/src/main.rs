//! Klaatu CLI - Main Entry Point
//!
//! Inspects and drives a running ping server, and waits for experiment
//! events to show up in the collected telemetry.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use klaatu_common::CorrelatorConfig;
use klaatu_correlator::PingClient;

mod commands;
mod output;

use commands::{pings, wait};

/// Klaatu CLI - Telemetry ping collector and experiment-event correlator
#[derive(Parser)]
#[command(name = "klaatu")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Ping server base URL
    #[arg(long, env = "KLAATU_PING_URL", global = true)]
    url: Option<String>,

    /// Correlator configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect and manage stored pings
    #[command(subcommand)]
    Pings(pings::PingCommands),

    /// Wait for an experiment event or scalar to be observed
    Wait(wait::WaitArgs),

    /// Check ping server status
    Status,

    /// Show version information
    Version,
}

impl Cli {
    fn correlator_config(&self) -> anyhow::Result<CorrelatorConfig> {
        let mut config = match &self.config {
            Some(path) => CorrelatorConfig::load(path)?,
            None => CorrelatorConfig::default(),
        };
        if let Some(url) = &self.url {
            config.base_url = url.clone();
        }
        if let Some(timeout) = self.timeout {
            config.request_timeout_secs = timeout;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = cli.correlator_config()?;
    let client = PingClient::from_config(&config)?;

    match cli.command {
        Commands::Pings(cmd) => pings::execute(cmd, client, cli.format).await?,
        Commands::Wait(args) => return Ok(wait::execute(args, client, &config, cli.format).await),
        Commands::Status => match client.health().await {
            Ok(health) => {
                let pings = health.get("pings").and_then(|p| p.as_u64()).unwrap_or(0);
                output::print_success(&format!(
                    "Ping server is running at {} ({} pings stored)",
                    client.base_url(),
                    pings
                ));
            }
            Err(e) => {
                output::print_error(&format!(
                    "Ping server is not responding at {}: {}",
                    client.base_url(),
                    e
                ));
                return Ok(ExitCode::FAILURE);
            }
        },
        Commands::Version => {
            println!("Klaatu CLI v{}", klaatu_common::VERSION);
            println!("Telemetry ping collector and experiment-event correlator");
        }
    }

    Ok(ExitCode::SUCCESS)
}

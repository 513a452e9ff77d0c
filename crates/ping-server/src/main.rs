//! Klaatu Ping Server
//!
//! Standalone collector that browsers under test report telemetry to.

use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use klaatu_common::PingServerConfig;
use klaatu_ping_server::PingServer;

#[derive(Parser)]
#[command(name = "klaatu-ping-server")]
#[command(about = "Collects telemetry pings for experiment tests")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "klaatu-ping-server.toml")]
    config: PathBuf,

    /// Listen address (overrides config and KLAATU_PING_LISTEN)
    #[arg(short, long)]
    listen: Option<String>,

    /// Maximum accepted request body in bytes
    #[arg(long)]
    max_body_bytes: Option<usize>,

    /// Reject gzip-encoded submissions instead of decompressing them
    #[arg(long)]
    no_gzip: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }

    info!("Klaatu ping server v{}", klaatu_common::VERSION);

    let mut config = PingServerConfig::load(&cli.config)?.with_env_overrides()?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(max_body_bytes) = cli.max_body_bytes {
        config.max_body_bytes = max_body_bytes;
    }
    if cli.no_gzip {
        config.accept_gzip = false;
    }

    PingServer::new(config).serve().await
}

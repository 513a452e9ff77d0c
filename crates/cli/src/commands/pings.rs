//! Ping store commands

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use std::path::{Path, PathBuf};

use klaatu_common::Ping;
use klaatu_correlator::{detect_shapes, normalize, PingClient, PingShape};

use crate::output::{print_list, print_success, OutputFormat, TableDisplay};

#[derive(Subcommand)]
pub enum PingCommands {
    /// List stored pings
    List {
        /// Print the raw documents instead of a summary
        #[arg(long)]
        raw: bool,
    },

    /// Remove every stored ping
    Clear,

    /// Submit a JSON document as a ping
    Submit {
        /// File to read, or `-` for stdin
        file: PathBuf,
    },
}

/// Ping summary for display
#[derive(Serialize)]
pub struct PingDisplay {
    pub index: usize,
    pub ping_type: Option<String>,
    pub shapes: Vec<PingShape>,
    pub records: usize,
    pub subsession_length: Option<i64>,
}

impl PingDisplay {
    fn new(index: usize, ping: &Ping) -> Self {
        Self {
            index,
            ping_type: ping.ping_type().map(str::to_string),
            shapes: detect_shapes(ping),
            records: normalize(ping).len(),
            subsession_length: ping.session_info().and_then(|s| s.subsession_length),
        }
    }
}

impl TableDisplay for PingDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["#", "Type", "Shapes", "Records", "Subsession"]
    }

    fn row(&self) -> Vec<String> {
        let shapes = if self.shapes.is_empty() {
            "-".to_string()
        } else {
            self.shapes
                .iter()
                .map(|s| format!("{:?}", s))
                .collect::<Vec<_>>()
                .join(", ")
        };

        vec![
            self.index.to_string(),
            self.ping_type.clone().unwrap_or_else(|| "-".to_string()),
            shapes,
            self.records.to_string(),
            self.subsession_length
                .map(|s| format!("{}s", s))
                .unwrap_or_else(|| "-".to_string()),
        ]
    }
}

fn read_document(file: &Path) -> Result<serde_json::Value> {
    let content = if file.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading stdin")?
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?
    };

    serde_json::from_str(&content).context("document is not valid JSON")
}

pub async fn execute(cmd: PingCommands, client: PingClient, format: OutputFormat) -> Result<()> {
    match cmd {
        PingCommands::List { raw } => {
            let pings = client.list().await?;
            if raw {
                println!("{}", serde_json::to_string_pretty(&pings)?);
            } else {
                let displays: Vec<PingDisplay> = pings
                    .iter()
                    .enumerate()
                    .map(|(i, ping)| PingDisplay::new(i, ping))
                    .collect();
                print_list(&displays, format);
            }
        }

        PingCommands::Clear => {
            client.clear().await?;
            print_success(&format!("Cleared pings at {}", client.base_url()));
        }

        PingCommands::Submit { file } => {
            let document = read_document(&file)?;
            client.submit(&document).await?;
            print_success(&format!("Ping submitted to {}", client.base_url()));
        }
    }

    Ok(())
}

//! Capacity probe CLI
//!
//! A command-line tool for validating test profiles, previewing ramp plans,
//! reading saved reports and watching a live runner.

mod client;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{profile, report, rules, status};
use std::path::PathBuf;
use std::time::Duration;

/// Capacity probe CLI
#[derive(Parser)]
#[command(name = "cprobe")]
#[command(author, version, about = "CLI for the capacity probe load tester", long_about = None)]
pub struct Cli {
    /// Runner API URL (can also be set via CPROBE_API_URL env var)
    #[arg(long, env = "CPROBE_API_URL", default_value = "http://localhost:9464", global = true)]
    pub api_url: String,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a test profile
    Validate {
        /// Profile file (TOML, JSON or YAML)
        profile: PathBuf,
    },

    /// Show target concurrency over the run
    Plan {
        /// Profile file (TOML, JSON or YAML)
        profile: PathBuf,

        /// Sampling step (e.g. 10s, 1m)
        #[arg(long, default_value = "10s", value_parser = parse_step)]
        step: Duration,
    },

    /// Render a saved run report
    Report {
        /// Report file written by capacity-probe
        file: PathBuf,
    },

    /// Re-run the recommendation engine over a saved report
    Recommend {
        /// Report file written by capacity-probe
        file: PathBuf,

        /// Built-in rule profile (default, lendings, books, quick)
        #[arg(long, default_value = "default")]
        rules: String,
    },

    /// List built-in rule profiles
    Rules,

    /// Show progress of a live run
    Status,
}

fn parse_step(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Validate { profile: path } => profile::validate(&path, cli.format),
        Commands::Plan { profile: path, step } => profile::plan(&path, step, cli.format),
        Commands::Report { file } => report::show_report(&file, cli.format),
        Commands::Recommend { file, rules } => report::recommend(&file, &rules, cli.format),
        Commands::Rules => rules::list_rules(cli.format),
        Commands::Status => {
            let client = client::ApiClient::new(&cli.api_url)
                .with_context(|| format!("Cannot use runner URL {}", cli.api_url))?;
            status::show_status(&client, cli.format).await
        }
    }
}

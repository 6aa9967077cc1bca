//! Capacity Probe - load test runner
//!
//! Executes a test profile against a target service, serves live progress
//! while the run is in flight, and writes the final report with its scaling
//! recommendation.

use anyhow::{Context, Result};
use probe_lib::{
    observability::RunnerMetrics, progress::ProgressRegistry, run::LoadTest, TestProfile,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const PROBE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exit code when the run completed but a threshold failed
const THRESHOLDS_FAILED_EXIT_CODE: i32 = 99;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!(version = PROBE_VERSION, "Starting capacity-probe");

    let mut config = config::RunnerConfig::load()?;
    if let Some(path) = std::env::args().nth(1) {
        config.profile_path = path.into();
    }
    info!(
        profile = %config.profile_path.display(),
        output = %config.output_path.display(),
        "Runner configured"
    );

    let profile = TestProfile::load(&config.profile_path)
        .with_context(|| format!("Failed to load profile {}", config.profile_path.display()))?;
    let plan = profile.plan().context("Invalid test profile")?;

    let progress = ProgressRegistry::new();
    let metrics = RunnerMetrics::new();
    let app_state = Arc::new(api::AppState::new(progress.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("SIGINT received, stopping workers");
                signal_token.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    let report = LoadTest::http(plan)
        .context("Failed to build protocol client")?
        .with_progress(progress)
        .run(cancel)
        .await
        .context("Load test could not start")?;

    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    tokio::fs::write(&config.output_path, json)
        .await
        .with_context(|| format!("Failed to write report to {}", config.output_path.display()))?;

    info!(
        path = %config.output_path.display(),
        total_requests = report.total_requests,
        success_rate_percent = report.success_rate_percent,
        p95_ms = report.latency.p95,
        action = %report.recommendation.action,
        replicas = report.recommendation.replicas,
        "Report written"
    );

    api_handle.abort();

    if !report.passed {
        warn!(
            failed = report.thresholds_failed,
            "Thresholds failed, exiting with code {}", THRESHOLDS_FAILED_EXIT_CODE
        );
        std::process::exit(THRESHOLDS_FAILED_EXIT_CODE);
    }

    Ok(())
}

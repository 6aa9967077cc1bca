//! Live run status from a runner's progress endpoint

use anyhow::Result;
use chrono::DateTime;
use colored::Colorize;
use probe_lib::{RunProgress, ScenarioPhase};
use tabled::{settings::Style, Tabled};

use crate::client::ApiClient;
use crate::output::{color_status, print_json, print_warning, OutputFormat};

#[derive(Tabled)]
struct ScenarioRow {
    #[tabled(rename = "Scenario")]
    name: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Workers")]
    workers: u64,
    #[tabled(rename = "Iterations")]
    iterations: u64,
    #[tabled(rename = "Updated")]
    updated: String,
}

fn phase_name(phase: ScenarioPhase) -> &'static str {
    match phase {
        ScenarioPhase::Pending => "pending",
        ScenarioPhase::Running => "running",
        ScenarioPhase::Completed => "completed",
        ScenarioPhase::Cancelled => "cancelled",
    }
}

/// Show the progress of a live run
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let progress: RunProgress = client.get("progress").await?;

    match format {
        OutputFormat::Json => print_json(&progress)?,
        OutputFormat::Table => {
            println!(
                "Run: {}  active workers: {}",
                color_status(phase_name(progress.phase)),
                progress.active_workers.to_string().bold()
            );

            if progress.scenarios.is_empty() {
                print_warning("No scenarios registered yet");
                return Ok(());
            }

            let rows: Vec<ScenarioRow> = progress
                .scenarios
                .iter()
                .map(|(name, s)| ScenarioRow {
                    name: name.clone(),
                    phase: color_status(phase_name(s.phase)),
                    workers: s.active_workers,
                    iterations: s.iterations,
                    updated: DateTime::from_timestamp(s.updated_at, 0)
                        .map(|t| t.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            println!("{}", tabled::Table::new(rows).with(Style::rounded()));
        }
    }

    Ok(())
}

//! Profile inspection commands: validation and ramp plans

use anyhow::{Context, Result};
use colored::Colorize;
use probe_lib::{ramp::RampPlan, TestPlan, TestProfile};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tabled::{builder::Builder, settings::Style, Tabled};

use crate::output::{format_duration, print_json, print_success, OutputFormat};

/// Row for the scenario summary table
#[derive(Tabled, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioRow {
    #[tabled(rename = "Scenario")]
    name: String,
    #[tabled(rename = "Executor")]
    executor: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Peak VUs")]
    peak: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationSummary {
    valid: bool,
    service_url: String,
    environment: String,
    operations: usize,
    thresholds: usize,
    rules: String,
    planned_duration_secs: u64,
    scenarios: Vec<ScenarioRow>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanPoint {
    offset_secs: u64,
    workers: Vec<(String, u64)>,
    total: u64,
}

fn load_plan(path: &Path) -> Result<TestPlan> {
    let profile = TestProfile::load(path)
        .with_context(|| format!("Failed to load profile {}", path.display()))?;
    profile
        .plan()
        .with_context(|| format!("Profile {} is invalid", path.display()))
}

fn scenario_rows(plan: &TestPlan) -> Vec<ScenarioRow> {
    plan.scenarios
        .iter()
        .map(|s| ScenarioRow {
            name: s.name.clone(),
            executor: s.executor.to_string(),
            start: format_duration(s.start_offset),
            duration: format_duration(s.total_duration()),
            peak: s.peak_target(),
        })
        .collect()
}

/// Validate a profile and summarise what it would run
pub fn validate(path: &Path, format: OutputFormat) -> Result<()> {
    let plan = load_plan(path)?;
    let summary = ValidationSummary {
        valid: true,
        service_url: plan.service_url.clone(),
        environment: plan.environment.clone(),
        operations: plan.catalog.operations().len(),
        thresholds: plan.thresholds.len(),
        rules: plan.rules.name().to_string(),
        planned_duration_secs: plan.planned_duration().as_secs(),
        scenarios: scenario_rows(&plan),
    };

    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_success(&format!("Profile {} is valid", path.display()));
            println!();
            println!("Service:     {}", summary.service_url.cyan());
            println!("Environment: {}", summary.environment);
            println!("Operations:  {}", summary.operations);
            println!("Thresholds:  {}", summary.thresholds);
            println!("Rules:       {}", summary.rules);
            println!(
                "Planned:     {}",
                format_duration(plan.planned_duration())
            );
            println!();

            let table = tabled::Table::new(summary.scenarios)
                .with(Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Workers each scenario asks for `at` into the run
fn scheduled_workers(plans: &[(String, Duration, RampPlan)], at: Duration) -> Vec<(String, u64)> {
    plans
        .iter()
        .map(|(name, offset, plan)| {
            let end = *offset + plan.total_duration();
            let workers = if at < *offset || at >= end {
                0
            } else {
                plan.concurrency_at(at - *offset)
            };
            (name.clone(), workers)
        })
        .collect()
}

/// Print target concurrency over the whole run, sampled every `step`
pub fn plan(path: &Path, step: Duration, format: OutputFormat) -> Result<()> {
    let plan = load_plan(path)?;
    let step = if step.is_zero() {
        Duration::from_secs(1)
    } else {
        step
    };

    let plans = plan
        .scenarios
        .iter()
        .map(|s| Ok((s.name.clone(), s.start_offset, RampPlan::from_scenario(s)?)))
        .collect::<Result<Vec<_>>>()?;

    let total = plan.planned_duration();
    let mut points = Vec::new();
    let mut at = Duration::ZERO;
    loop {
        let workers = scheduled_workers(&plans, at);
        let sum = workers.iter().map(|(_, w)| w).sum();
        points.push(PlanPoint {
            offset_secs: at.as_secs(),
            workers,
            total: sum,
        });
        if at >= total {
            break;
        }
        at = (at + step).min(total);
    }

    match format {
        OutputFormat::Json => print_json(&points)?,
        OutputFormat::Table => {
            let mut builder = Builder::default();
            let mut header = vec!["Time".to_string()];
            header.extend(plans.iter().map(|(name, _, _)| name.clone()));
            header.push("Total".to_string());
            builder.push_record(header);

            for point in &points {
                let mut row = vec![format_duration(Duration::from_secs(point.offset_secs))];
                row.extend(point.workers.iter().map(|(_, w)| w.to_string()));
                row.push(point.total.to_string().bold().to_string());
                builder.push_record(row);
            }

            println!("{}", builder.build().with(Style::rounded()));
            let peak = points.iter().map(|p| p.total).max().unwrap_or(0);
            println!(
                "\nPlanned duration: {}, peak workers: {}",
                format_duration(total),
                peak
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe_lib::{Scenario, Stage};

    #[test]
    fn test_scheduled_workers_respects_offsets() {
        let warmup = Scenario::constant("warmup", 5, Duration::from_secs(30));
        let spike = Scenario::ramping(
            "spike",
            0,
            vec![
                Stage::new(Duration::from_secs(10), 100),
                Stage::new(Duration::from_secs(10), 0),
            ],
        )
        .with_start_offset(Duration::from_secs(20));

        let plans: Vec<_> = [warmup, spike]
            .iter()
            .map(|s| {
                (
                    s.name.clone(),
                    s.start_offset,
                    RampPlan::from_scenario(s).unwrap(),
                )
            })
            .collect();

        let at = |secs| scheduled_workers(&plans, Duration::from_secs(secs));
        assert_eq!(at(0), vec![("warmup".into(), 5), ("spike".into(), 0)]);
        assert_eq!(at(25), vec![("warmup".into(), 5), ("spike".into(), 50)]);
        assert_eq!(at(30), vec![("warmup".into(), 0), ("spike".into(), 100)]);
        assert_eq!(at(40), vec![("warmup".into(), 0), ("spike".into(), 0)]);
    }
}

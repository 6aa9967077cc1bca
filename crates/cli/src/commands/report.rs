//! Saved report commands: rendering and re-recommending

use anyhow::{Context, Result};
use colored::Colorize;
use probe_lib::{recommendation::builtin, Recommendation, RunReport};
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Tabled};

use crate::output::{
    color_action, color_passed, color_status, format_duration, format_ms, format_percent,
    print_info, print_json, print_warning, OutputFormat,
};

/// Row for the thresholds table
#[derive(Tabled)]
struct ThresholdRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Threshold")]
    expression: String,
    #[tabled(rename = "Observed")]
    observed: String,
    #[tabled(rename = "Result")]
    result: String,
}

/// Row for the scenarios table
#[derive(Tabled)]
struct ScenarioRow {
    #[tabled(rename = "Scenario")]
    name: String,
    #[tabled(rename = "Executor")]
    executor: String,
    #[tabled(rename = "Start")]
    start: String,
    #[tabled(rename = "Planned")]
    planned: String,
    #[tabled(rename = "Iterations")]
    iterations: u64,
    #[tabled(rename = "Peak")]
    peak: u64,
    #[tabled(rename = "Phase")]
    phase: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Rerun {
    rules: String,
    saved: Recommendation,
    recommendation: Recommendation,
    changed: bool,
}

/// Read a report written by the runner
pub fn load_report(path: &Path) -> Result<RunReport> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read report {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a capacity-probe report", path.display()))
}

/// Render a saved report
pub fn show_report(path: &Path, format: OutputFormat) -> Result<()> {
    let report = load_report(path)?;

    if let OutputFormat::Json = format {
        return print_json(&report);
    }

    println!("{}", "Load Test Report".bold());
    println!("{}", "=".repeat(60));
    println!("Service:      {}", report.service_url.cyan());
    println!("Environment:  {}", report.environment);
    println!(
        "Finished:     {}",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("Duration:     {:.1}s", report.duration_seconds);
    println!();

    println!("{}", "Requests".bold());
    println!("  Total:        {}", report.total_requests);
    println!("  Successful:   {}", report.successful_requests);
    println!("  Failed:       {}", report.failed_requests);
    println!("  Success rate: {}", format_percent(report.success_rate_percent));
    println!("  Throughput:   {:.2} req/s", report.requests_per_second);
    println!(
        "  Baseline:     {:.0} req/s ({:+.1}%)",
        report.baseline.baseline_rps, report.baseline.improvement_percent
    );
    println!("  Peak workers: {}", report.vus_max);
    println!();

    println!("{}", "Latency".bold());
    println!(
        "  avg {}  med {}  p90 {}  p95 {}  p99 {}  max {}",
        format_ms(report.latency.avg),
        format_ms(report.latency.med),
        format_ms(report.latency.p90),
        format_ms(report.latency.p95),
        format_ms(report.latency.p99),
        format_ms(report.latency.max),
    );
    println!();

    if !report.scenarios.is_empty() {
        let rows: Vec<ScenarioRow> = report
            .scenarios
            .iter()
            .map(|s| ScenarioRow {
                name: s.name.clone(),
                executor: s.executor.to_string(),
                start: format_duration(s.start_offset),
                planned: format_duration(s.planned_duration),
                iterations: s.pool.iterations,
                peak: s.pool.peak_workers,
                phase: color_status(&format!("{:?}", s.phase).to_lowercase()),
            })
            .collect();
        println!("{}", tabled::Table::new(rows).with(Style::rounded()));
        println!();
    }

    if report.thresholds.is_empty() {
        print_info("No thresholds configured");
    } else {
        let rows: Vec<ThresholdRow> = report
            .thresholds
            .iter()
            .map(|t| ThresholdRow {
                metric: t.metric.clone(),
                expression: t.expression.clone(),
                observed: t
                    .observed
                    .map(|v| format!("{:.4}", v))
                    .unwrap_or_else(|| "-".to_string()),
                result: color_passed(t.passed),
            })
            .collect();
        println!("{}", tabled::Table::new(rows).with(Style::rounded()));
        println!(
            "Thresholds: {} passed, {} failed",
            report.thresholds_passed, report.thresholds_failed
        );
    }

    if report.deadline_exceeded {
        print_warning("Run stopped at its maximum duration");
    }
    if report.cancelled {
        print_warning("Run was cancelled before every scenario finished");
    }
    if report.discarded_iterations > 0 {
        print_warning(&format!(
            "{} in-flight iterations were discarded at shutdown",
            report.discarded_iterations
        ));
    }

    println!();
    print_recommendation(&report.recommendation);
    Ok(())
}

fn print_recommendation(recommendation: &Recommendation) {
    println!("{}", "Recommendation".bold());
    println!(
        "  {} to {} replicas",
        color_action(recommendation.action),
        recommendation.replicas
    );
    println!("  {}", recommendation.reason);
    println!("  (rule: {})", recommendation.rule.dimmed());
}

/// Re-run the recommendation engine over a saved report's signals
pub fn recommend(path: &Path, rules: &str, format: OutputFormat) -> Result<()> {
    let report = load_report(path)?;
    let table = builtin(rules)?;
    let recommendation = table.recommend(&report.signals);
    let changed = recommendation.action != report.recommendation.action
        || recommendation.replicas != report.recommendation.replicas;

    let rerun = Rerun {
        rules: table.name().to_string(),
        saved: report.recommendation,
        recommendation,
        changed,
    };

    match format {
        OutputFormat::Json => print_json(&rerun)?,
        OutputFormat::Table => {
            print_info(&format!("Rule profile: {}", rerun.rules));
            print_recommendation(&rerun.recommendation);
            if rerun.changed {
                print_warning(&format!(
                    "Differs from the saved recommendation: {} to {} replicas",
                    rerun.saved.action, rerun.saved.replicas
                ));
            }
        }
    }

    Ok(())
}

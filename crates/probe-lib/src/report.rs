//! Final run report
//!
//! The one artifact a run persists. Formatting (JSON file, tables) is left
//! to the binaries.

use crate::metrics::{names, MetricsSnapshot};
use crate::profile::TestPlan;
use crate::recommendation::{Recommendation, RunSignals};
use crate::scheduler::{ScenarioOutcome, ScheduleOutcome};
use crate::thresholds::{tally, ThresholdResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latency distribution of all requests, milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub med: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Observed throughput against the configured baseline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineComparison {
    pub baseline_rps: f64,
    pub observed_rps: f64,
    /// Relative difference, percent; zero when the baseline is zero
    pub improvement_percent: f64,
}

impl BaselineComparison {
    pub fn new(baseline_rps: f64, observed_rps: f64) -> Self {
        let improvement_percent = if baseline_rps > 0.0 {
            (observed_rps - baseline_rps) / baseline_rps * 100.0
        } else {
            0.0
        };
        Self {
            baseline_rps,
            observed_rps,
            improvement_percent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub service_url: String,

    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate_percent: f64,
    pub error_rate_percent: f64,
    pub duration_seconds: f64,
    pub requests_per_second: f64,
    pub iterations: u64,
    pub vus_max: u64,
    pub latency: LatencySummary,

    pub thresholds_passed: usize,
    pub thresholds_failed: usize,
    /// Every threshold held
    pub passed: bool,
    pub thresholds: Vec<ThresholdResult>,

    pub baseline: BaselineComparison,
    pub scenarios: Vec<ScenarioOutcome>,
    pub deadline_exceeded: bool,
    pub cancelled: bool,
    /// Iterations aborted after the shutdown grace period
    pub discarded_iterations: u64,

    pub signals: RunSignals,
    pub recommendation: Recommendation,
}

impl RunReport {
    pub fn build(
        plan: &TestPlan,
        snapshot: &MetricsSnapshot,
        schedule: &ScheduleOutcome,
        thresholds: Vec<ThresholdResult>,
        signals: RunSignals,
        recommendation: Recommendation,
    ) -> Self {
        let total_requests = snapshot
            .counter(names::HTTP_REQS)
            .map(|c| c.total as u64)
            .unwrap_or(0);
        let failed_requests = snapshot
            .rate(names::HTTP_REQ_FAILED)
            .map(|r| r.passes)
            .unwrap_or(0)
            .min(total_requests);
        let successful_requests = total_requests - failed_requests;

        let duration_seconds = schedule.elapsed.as_secs_f64();
        let requests_per_second = if duration_seconds > 0.0 {
            total_requests as f64 / duration_seconds
        } else {
            0.0
        };
        let percent = |part: u64| {
            if total_requests > 0 {
                part as f64 / total_requests as f64 * 100.0
            } else {
                0.0
            }
        };

        let latency = snapshot
            .trend(names::HTTP_REQ_DURATION)
            .map(|t| LatencySummary {
                avg: t.avg,
                min: t.min,
                max: t.max,
                med: t.med,
                p90: t.p90,
                p95: t.p95,
                p99: t.p99,
            })
            .unwrap_or_default();

        let (thresholds_passed, thresholds_failed) = tally(&thresholds);

        Self {
            timestamp: Utc::now(),
            environment: plan.environment.clone(),
            service_url: plan.service_url.clone(),
            total_requests,
            successful_requests,
            failed_requests,
            success_rate_percent: percent(successful_requests),
            error_rate_percent: percent(failed_requests),
            duration_seconds,
            requests_per_second,
            iterations: schedule.iterations(),
            vus_max: snapshot.gauge(names::VUS).map(|g| g.max as u64).unwrap_or(0),
            latency,
            thresholds_passed,
            thresholds_failed,
            passed: thresholds_failed == 0,
            thresholds,
            baseline: BaselineComparison::new(plan.baseline_rps, requests_per_second),
            scenarios: schedule.scenarios.clone(),
            deadline_exceeded: schedule.deadline_exceeded,
            cancelled: schedule.cancelled,
            discarded_iterations: schedule.discarded(),
            signals,
            recommendation,
        }
    }
}

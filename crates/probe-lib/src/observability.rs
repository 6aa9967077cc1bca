//! Observability infrastructure for the load probe
//!
//! Provides:
//! - Prometheus metrics (active workers, iterations, request latency, failures)
//! - Structured JSON logging with tracing

use crate::recommendation::Recommendation;
use crate::thresholds::ThresholdResult;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for request latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RunnerMetricsInner> = OnceLock::new();

struct RunnerMetricsInner {
    active_workers: GaugeVec,
    iterations_total: IntCounterVec,
    request_duration_seconds: Histogram,
    request_failures: IntCounter,
    iterations_discarded: IntCounter,
}

impl RunnerMetricsInner {
    fn new() -> Self {
        Self {
            active_workers: register_gauge_vec!(
                "capacity_probe_active_workers",
                "Virtual workers currently alive per scenario",
                &["scenario"]
            )
            .expect("Failed to register active_workers"),

            iterations_total: register_int_counter_vec!(
                "capacity_probe_iterations_total",
                "Completed worker iterations per scenario",
                &["scenario"]
            )
            .expect("Failed to register iterations_total"),

            request_duration_seconds: register_histogram!(
                "capacity_probe_request_duration_seconds",
                "Latency of requests issued against the target service",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register request_duration_seconds"),

            request_failures: register_int_counter!(
                "capacity_probe_request_failures_total",
                "Requests that did not meet their success predicate"
            )
            .expect("Failed to register request_failures"),

            iterations_discarded: register_int_counter!(
                "capacity_probe_iterations_discarded_total",
                "In-flight iterations aborted after the shutdown grace period"
            )
            .expect("Failed to register iterations_discarded"),
        }
    }
}

/// Runner metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct RunnerMetrics {
    _private: (),
}

impl Default for RunnerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RunnerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RunnerMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn set_active_workers(&self, scenario: &str, count: usize) {
        self.inner()
            .active_workers
            .with_label_values(&[scenario])
            .set(count as f64);
    }

    pub fn inc_iterations(&self, scenario: &str) {
        self.inner()
            .iterations_total
            .with_label_values(&[scenario])
            .inc();
    }

    pub fn observe_request(&self, duration: Duration, failed: bool) {
        self.inner()
            .request_duration_seconds
            .observe(duration.as_secs_f64());
        if failed {
            self.inner().request_failures.inc();
        }
    }

    pub fn add_discarded_iterations(&self, count: u64) {
        self.inner().iterations_discarded.inc_by(count);
    }
}

/// Structured logger for run events
///
/// Emits consistent JSON-friendly events for scenario lifecycle,
/// threshold evaluation and the final recommendation.
#[derive(Clone)]
pub struct StructuredLogger {
    environment: String,
}

impl StructuredLogger {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn log_run_started(&self, service_url: &str, scenarios: usize, planned: Duration) {
        info!(
            event = "run_started",
            environment = %self.environment,
            service_url = %service_url,
            scenarios = scenarios,
            planned_secs = planned.as_secs(),
            "Load test started"
        );
    }

    pub fn log_preflight(&self, path: &str, status: Option<u16>) {
        match status {
            Some(200) => info!(
                event = "preflight",
                environment = %self.environment,
                path = %path,
                "Service health check passed"
            ),
            other => warn!(
                event = "preflight",
                environment = %self.environment,
                path = %path,
                status = ?other,
                "Service health check did not return 200, continuing"
            ),
        }
    }

    pub fn log_scenario_started(&self, scenario: &str, executor: &str, peak_target: u64) {
        info!(
            event = "scenario_started",
            environment = %self.environment,
            scenario = %scenario,
            executor = %executor,
            peak_target = peak_target,
            "Scenario started"
        );
    }

    pub fn log_scenario_completed(
        &self,
        scenario: &str,
        iterations: u64,
        peak_workers: u64,
        discarded: u64,
        cancelled: bool,
    ) {
        if discarded > 0 {
            warn!(
                event = "scenario_completed",
                environment = %self.environment,
                scenario = %scenario,
                iterations = iterations,
                peak_workers = peak_workers,
                discarded = discarded,
                cancelled = cancelled,
                "Scenario finished with aborted iterations"
            );
        } else {
            info!(
                event = "scenario_completed",
                environment = %self.environment,
                scenario = %scenario,
                iterations = iterations,
                peak_workers = peak_workers,
                cancelled = cancelled,
                "Scenario finished"
            );
        }
    }

    pub fn log_threshold(&self, result: &ThresholdResult) {
        if result.passed {
            info!(
                event = "threshold_evaluated",
                environment = %self.environment,
                metric = %result.metric,
                expression = %result.expression,
                observed = ?result.observed,
                passed = true,
                "Threshold passed"
            );
        } else {
            warn!(
                event = "threshold_evaluated",
                environment = %self.environment,
                metric = %result.metric,
                expression = %result.expression,
                observed = ?result.observed,
                passed = false,
                reason = ?result.reason,
                "Threshold failed"
            );
        }
    }

    pub fn log_threshold_breach(&self, result: &ThresholdResult, abort: bool) {
        warn!(
            event = "threshold_breached",
            environment = %self.environment,
            metric = %result.metric,
            expression = %result.expression,
            observed = ?result.observed,
            abort = abort,
            "Threshold breached during run"
        );
    }

    pub fn log_recommendation(&self, recommendation: &Recommendation) {
        info!(
            event = "recommendation_issued",
            environment = %self.environment,
            action = %recommendation.action,
            replicas = recommendation.replicas,
            rule = %recommendation.rule,
            reason = %recommendation.reason,
            "Scaling recommendation issued"
        );
    }

    pub fn log_run_finished(
        &self,
        total_requests: u64,
        requests_per_second: f64,
        thresholds_passed: bool,
        deadline_exceeded: bool,
    ) {
        if thresholds_passed {
            info!(
                event = "run_finished",
                environment = %self.environment,
                total_requests = total_requests,
                requests_per_second = requests_per_second,
                thresholds_passed = true,
                deadline_exceeded = deadline_exceeded,
                "Load test finished"
            );
        } else {
            warn!(
                event = "run_finished",
                environment = %self.environment,
                total_requests = total_requests,
                requests_per_second = requests_per_second,
                thresholds_passed = false,
                deadline_exceeded = deadline_exceeded,
                "Load test finished with failed thresholds"
            );
        }
    }

    pub fn log_run_cancelled(&self, reason: &str) {
        warn!(
            event = "run_cancelled",
            environment = %self.environment,
            reason = %reason,
            "Load test cancelled"
        );
    }
}

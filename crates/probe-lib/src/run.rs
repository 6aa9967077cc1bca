//! Load test orchestration
//!
//! Wires a validated [`TestPlan`] through the whole pipeline: preflight,
//! scheduling, interval threshold checks, final evaluation, recommendation
//! and the report.

use crate::error::{ConfigError, ProtocolError};
use crate::metrics::MetricCollector;
use crate::observability::StructuredLogger;
use crate::profile::TestPlan;
use crate::progress::ProgressRegistry;
use crate::protocol::{HttpProtocolClient, ProtocolClient};
use crate::recommendation::RunSignals;
use crate::report::RunReport;
use crate::scheduler::ScenarioScheduler;
use crate::thresholds::{evaluate, ThresholdMonitor};
use crate::workload::{CatalogIteration, ExpectedStatus, Operation};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One configured load test
pub struct LoadTest {
    plan: TestPlan,
    client: Arc<dyn ProtocolClient>,
    progress: ProgressRegistry,
    logger: StructuredLogger,
}

impl LoadTest {
    pub fn new(plan: TestPlan, client: Arc<dyn ProtocolClient>) -> Self {
        let logger = StructuredLogger::new(plan.environment.as_str());
        Self {
            plan,
            client,
            progress: ProgressRegistry::new(),
            logger,
        }
    }

    /// Load test against the plan's service over HTTP
    pub fn http(plan: TestPlan) -> Result<Self, ProtocolError> {
        let client = HttpProtocolClient::new(&plan.service_url, plan.request_timeout)?;
        Ok(Self::new(plan, Arc::new(client)))
    }

    pub fn with_progress(mut self, progress: ProgressRegistry) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    pub fn plan(&self) -> &TestPlan {
        &self.plan
    }

    /// Execute the run; a report is produced even when thresholds fail or
    /// the run is cut short
    pub async fn run(self, cancel: CancellationToken) -> Result<RunReport, ConfigError> {
        let plan = self.plan;
        let logger = self.logger;

        logger.log_run_started(
            &plan.service_url,
            plan.scenarios.len(),
            plan.planned_duration(),
        );

        if let Some(path) = &plan.health_path {
            let check = Operation {
                expected_status: vec![ExpectedStatus::Code(200)],
                ..Operation::get("preflight", path.as_str())
            };
            let outcome = self.client.invoke(&check).await;
            logger.log_preflight(path, outcome.status);
        }

        let collector = Arc::new(MetricCollector::new());
        let body = Arc::new(CatalogIteration::new(
            Arc::new(plan.catalog.clone()),
            self.client.clone(),
        ));
        let scheduler = ScenarioScheduler::new(plan.scenarios.clone(), body, collector.clone())?
            .with_pool_config(plan.pool.clone())
            .with_progress(self.progress.clone())
            .with_logger(logger.clone())
            .with_budget(plan.max_duration);

        let run_token = cancel.child_token();
        let monitor_stop = CancellationToken::new();
        let monitor = plan.threshold_check_interval.map(|interval| {
            let monitor = ThresholdMonitor::new(plan.thresholds.clone(), collector.clone(), interval)
                .with_logger(logger.clone());
            tokio::spawn(monitor.run(monitor_stop.clone(), run_token.clone()))
        });

        let schedule = scheduler.run(run_token.clone()).await;
        monitor_stop.cancel();

        let mut aborted_by_threshold = false;
        if let Some(handle) = monitor {
            if let Ok(breaches) = handle.await {
                aborted_by_threshold = breaches.iter().any(|b| b.abort_on_fail);
            }
        }

        let snapshot = collector.snapshot_all();
        let thresholds = evaluate(&plan.thresholds, &snapshot, plan.missing_metric);
        for result in &thresholds {
            logger.log_threshold(result);
        }

        let signals = RunSignals::from_snapshot(&snapshot, plan.baseline_rps);
        let recommendation = plan.rules.recommend(&signals);
        logger.log_recommendation(&recommendation);

        let report = RunReport::build(
            &plan,
            &snapshot,
            &schedule,
            thresholds,
            signals,
            recommendation,
        );

        if aborted_by_threshold {
            logger.log_run_cancelled("threshold breached with abortOnFail");
        } else if cancel.is_cancelled() {
            logger.log_run_cancelled("shutdown requested");
        }
        logger.log_run_finished(
            report.total_requests,
            report.requests_per_second,
            report.passed,
            report.deadline_exceeded,
        );

        Ok(report)
    }
}

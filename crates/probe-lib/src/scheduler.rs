//! Scenario scheduling
//!
//! Runs every scenario's worker pool on one shared timeline. Each scenario
//! starts after its own offset and then proceeds independently, so worker
//! populations of overlapping scenarios add up.

use crate::error::ConfigError;
use crate::metrics::MetricCollector;
use crate::models::{ExecutorKind, Scenario};
use crate::observability::StructuredLogger;
use crate::progress::{ProgressRegistry, ScenarioPhase};
use crate::ramp::RampPlan;
use crate::workers::{IterationBody, PoolConfig, PoolOutcome, WorkerPool};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Result of one scenario within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioOutcome {
    pub name: String,
    pub executor: ExecutorKind,
    #[serde(with = "humantime_serde")]
    pub start_offset: Duration,
    #[serde(with = "humantime_serde")]
    pub planned_duration: Duration,
    pub phase: ScenarioPhase,
    #[serde(flatten)]
    pub pool: PoolOutcome,
}

/// Result of a whole scheduled run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOutcome {
    pub scenarios: Vec<ScenarioOutcome>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
    /// The run-wide budget expired before every scenario finished
    pub deadline_exceeded: bool,
    /// The caller's cancel signal fired
    pub cancelled: bool,
}

impl ScheduleOutcome {
    pub fn iterations(&self) -> u64 {
        self.scenarios.iter().map(|s| s.pool.iterations).sum()
    }

    pub fn discarded(&self) -> u64 {
        self.scenarios.iter().map(|s| s.pool.discarded).sum()
    }
}

struct PlannedScenario {
    scenario: Scenario,
    plan: RampPlan,
}

/// Runs a set of scenarios concurrently against one iteration body
pub struct ScenarioScheduler {
    scenarios: Vec<PlannedScenario>,
    body: Arc<dyn IterationBody>,
    collector: Arc<MetricCollector>,
    pool_config: PoolConfig,
    progress: ProgressRegistry,
    logger: Option<StructuredLogger>,
    budget: Option<Duration>,
}

impl ScenarioScheduler {
    /// Plan every scenario up front; any malformed one rejects the whole run
    pub fn new(
        scenarios: Vec<Scenario>,
        body: Arc<dyn IterationBody>,
        collector: Arc<MetricCollector>,
    ) -> Result<Self, ConfigError> {
        if scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }

        let mut seen = HashSet::new();
        let mut planned = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            if !seen.insert(scenario.name.clone()) {
                return Err(ConfigError::DuplicateScenario(scenario.name));
            }
            let plan = RampPlan::from_scenario(&scenario)?;
            planned.push(PlannedScenario { scenario, plan });
        }

        Ok(Self {
            scenarios: planned,
            body,
            collector,
            pool_config: PoolConfig::default(),
            progress: ProgressRegistry::new(),
            logger: None,
            budget: None,
        })
    }

    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    pub fn with_progress(mut self, progress: ProgressRegistry) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Cap the whole run; scenarios still running at the deadline are cancelled
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.budget = budget;
        self
    }

    /// When the last scenario is planned to end
    pub fn planned_duration(&self) -> Duration {
        self.scenarios
            .iter()
            .map(|p| p.scenario.end_offset())
            .max()
            .unwrap_or_default()
    }

    pub fn progress(&self) -> &ProgressRegistry {
        &self.progress
    }

    /// Run all scenarios to completion, the budget, or `cancel`
    pub async fn run(self, cancel: CancellationToken) -> ScheduleOutcome {
        let start = Instant::now();
        let run_token = cancel.child_token();
        let deadline_exceeded = Arc::new(AtomicBool::new(false));

        for planned in &self.scenarios {
            self.progress.register(&planned.scenario.name).await;
        }

        info!(
            scenarios = self.scenarios.len(),
            planned_secs = self.planned_duration().as_secs(),
            budget_secs = ?self.budget.map(|b| b.as_secs()),
            "Starting scenario scheduler"
        );

        let watchdog = self.budget.map(|budget| {
            let token = run_token.clone();
            let exceeded = deadline_exceeded.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {}
                    _ = sleep(budget) => {
                        exceeded.store(true, Ordering::SeqCst);
                        token.cancel();
                    }
                }
            })
        });

        let mut handles: Vec<(String, ExecutorKind, Duration, Duration, JoinHandle<ScenarioOutcome>)> =
            Vec::with_capacity(self.scenarios.len());
        for planned in self.scenarios {
            let name = planned.scenario.name.clone();
            let executor = planned.scenario.executor;
            let offset = planned.scenario.start_offset;
            let planned_duration = planned.plan.total_duration();

            let task = ScenarioTask {
                planned,
                body: self.body.clone(),
                collector: self.collector.clone(),
                pool_config: self.pool_config.clone(),
                progress: self.progress.clone(),
                logger: self.logger.clone(),
            };
            let handle = tokio::spawn(task.run(run_token.clone()));
            handles.push((name, executor, offset, planned_duration, handle));
        }

        let mut scenarios = Vec::with_capacity(handles.len());
        for (name, executor, start_offset, planned_duration, handle) in handles {
            match handle.await {
                Ok(outcome) => scenarios.push(outcome),
                Err(e) => {
                    error!(scenario = %name, error = %e, "Scenario task failed");
                    self.progress.set_phase(&name, ScenarioPhase::Cancelled).await;
                    scenarios.push(ScenarioOutcome {
                        name,
                        executor,
                        start_offset,
                        planned_duration,
                        phase: ScenarioPhase::Cancelled,
                        pool: PoolOutcome {
                            cancelled: true,
                            ..PoolOutcome::default()
                        },
                    });
                }
            }
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        let outcome = ScheduleOutcome {
            scenarios,
            elapsed: start.elapsed(),
            deadline_exceeded: deadline_exceeded.load(Ordering::SeqCst),
            cancelled: cancel.is_cancelled(),
        };

        info!(
            elapsed_secs = outcome.elapsed.as_secs_f64(),
            iterations = outcome.iterations(),
            deadline_exceeded = outcome.deadline_exceeded,
            cancelled = outcome.cancelled,
            "Scenario scheduler finished"
        );

        outcome
    }
}

/// Everything one scenario needs on its own task
struct ScenarioTask {
    planned: PlannedScenario,
    body: Arc<dyn IterationBody>,
    collector: Arc<MetricCollector>,
    pool_config: PoolConfig,
    progress: ProgressRegistry,
    logger: Option<StructuredLogger>,
}

impl ScenarioTask {
    async fn run(self, cancel: CancellationToken) -> ScenarioOutcome {
        let PlannedScenario { scenario, plan } = self.planned;
        let mut outcome = ScenarioOutcome {
            name: scenario.name.clone(),
            executor: scenario.executor,
            start_offset: scenario.start_offset,
            planned_duration: plan.total_duration(),
            phase: ScenarioPhase::Pending,
            pool: PoolOutcome::default(),
        };

        if !scenario.start_offset.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep(scenario.start_offset) => {}
            }
        }

        if cancel.is_cancelled() {
            info!(scenario = %scenario.name, "Scenario cancelled before start");
            outcome.phase = ScenarioPhase::Cancelled;
            outcome.pool.cancelled = true;
            self.progress
                .set_phase(&scenario.name, ScenarioPhase::Cancelled)
                .await;
            return outcome;
        }

        self.progress
            .set_phase(&scenario.name, ScenarioPhase::Running)
            .await;
        if let Some(logger) = &self.logger {
            logger.log_scenario_started(
                &scenario.name,
                &scenario.executor.to_string(),
                plan.peak(),
            );
        }

        let pool = WorkerPool::new(
            scenario.name.as_str(),
            plan,
            self.body,
            self.collector,
            self.pool_config,
        )
        .with_tags(&scenario.tags)
        .with_progress(self.progress.clone());

        outcome.pool = pool.run(cancel).await;
        outcome.phase = if outcome.pool.cancelled {
            ScenarioPhase::Cancelled
        } else {
            ScenarioPhase::Completed
        };

        self.progress.set_phase(&scenario.name, outcome.phase).await;
        if let Some(logger) = &self.logger {
            logger.log_scenario_completed(
                &scenario.name,
                outcome.pool.iterations,
                outcome.pool.peak_workers,
                outcome.pool.discarded,
                outcome.pool.cancelled,
            );
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::names;
    use crate::models::Stage;
    use crate::workers::{IterationContext, ThinkTime};
    use async_trait::async_trait;

    struct FixedLatency(Duration);

    #[async_trait]
    impl IterationBody for FixedLatency {
        async fn iterate(&self, ctx: &mut IterationContext) {
            sleep(self.0).await;
            ctx.counter(names::HTTP_REQS, 1.0);
        }
    }

    fn scheduler(scenarios: Vec<Scenario>) -> (ScenarioScheduler, Arc<MetricCollector>) {
        let collector = Arc::new(MetricCollector::new());
        let scheduler = ScenarioScheduler::new(
            scenarios,
            Arc::new(FixedLatency(Duration::from_millis(100))),
            collector.clone(),
        )
        .unwrap()
        .with_pool_config(PoolConfig {
            poll_interval: Duration::from_millis(100),
            think_time: ThinkTime::none(),
            grace_period: Duration::from_secs(5),
            seed: Some(1),
        });
        (scheduler, collector)
    }

    #[test]
    fn test_rejects_empty_and_duplicate_scenarios() {
        let collector = Arc::new(MetricCollector::new());
        let body: Arc<dyn IterationBody> = Arc::new(FixedLatency(Duration::from_millis(1)));

        let empty = ScenarioScheduler::new(vec![], body.clone(), collector.clone());
        assert!(matches!(empty, Err(ConfigError::NoScenarios)));

        let duplicate = ScenarioScheduler::new(
            vec![
                Scenario::constant("smoke", 1, Duration::from_secs(1)),
                Scenario::constant("smoke", 2, Duration::from_secs(1)),
            ],
            body.clone(),
            collector.clone(),
        );
        assert!(matches!(duplicate, Err(ConfigError::DuplicateScenario(name)) if name == "smoke"));

        let malformed = ScenarioScheduler::new(
            vec![Scenario::ramping("bad", 0, vec![])],
            body,
            collector,
        );
        assert!(matches!(malformed, Err(ConfigError::EmptyStages { .. })));
    }

    #[test]
    fn test_planned_duration_is_latest_end() {
        let (scheduler, _) = scheduler(vec![
            Scenario::constant("background", 5, Duration::from_secs(60)),
            Scenario::ramping(
                "spike",
                0,
                vec![
                    Stage::new(Duration::from_secs(10), 100),
                    Stage::new(Duration::from_secs(30), 0),
                ],
            )
            .with_start_offset(Duration::from_secs(45)),
        ]);
        assert_eq!(scheduler.planned_duration(), Duration::from_secs(85));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_scenarios_are_additive() {
        let (scheduler, collector) = scheduler(vec![
            Scenario::constant("background", 10, Duration::from_secs(4)),
            Scenario::constant("spike", 20, Duration::from_secs(2))
                .with_start_offset(Duration::from_secs(1)),
        ]);

        let outcome = scheduler.run(CancellationToken::new()).await;

        let vus = collector.snapshot_all().gauge(names::VUS).cloned().unwrap();
        assert_eq!(vus.max, 30.0);
        assert_eq!(vus.value, 0.0);
        assert!(!outcome.deadline_exceeded);
        assert!(outcome
            .scenarios
            .iter()
            .all(|s| s.phase == ScenarioPhase::Completed));
        assert_eq!(outcome.scenarios[0].name, "background");
        assert_eq!(outcome.scenarios[1].pool.peak_workers, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_completion_is_max_of_offset_plus_duration() {
        let (scheduler, _) = scheduler(vec![
            Scenario::constant("first", 2, Duration::from_secs(2)),
            Scenario::constant("later", 2, Duration::from_secs(1))
                .with_start_offset(Duration::from_secs(3)),
        ]);

        let outcome = scheduler.run(CancellationToken::new()).await;

        assert!(outcome.elapsed >= Duration::from_secs(4));
        assert!(outcome.elapsed < Duration::from_millis(4_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_cancels_run() {
        let (scheduler, _) = scheduler(vec![
            Scenario::constant("long", 3, Duration::from_secs(600)),
            Scenario::constant("late", 3, Duration::from_secs(10))
                .with_start_offset(Duration::from_secs(300)),
        ]);
        let scheduler = scheduler.with_budget(Some(Duration::from_secs(2)));
        let progress = scheduler.progress().clone();

        let outcome = scheduler.run(CancellationToken::new()).await;

        assert!(outcome.deadline_exceeded);
        assert!(!outcome.cancelled);
        assert!(outcome.elapsed < Duration::from_secs(3));
        assert!(outcome
            .scenarios
            .iter()
            .all(|s| s.phase == ScenarioPhase::Cancelled));
        assert_eq!(outcome.scenarios[1].pool.spawned, 0);
        assert_eq!(progress.progress().await.phase, ScenarioPhase::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_cancel() {
        let (scheduler, collector) = scheduler(vec![Scenario::constant(
            "steady",
            4,
            Duration::from_secs(120),
        )]);
        let cancel = CancellationToken::new();
        let run = tokio::spawn(scheduler.run(cancel.clone()));

        sleep(Duration::from_millis(1_050)).await;
        cancel.cancel();
        let outcome = run.await.unwrap();

        assert!(outcome.cancelled);
        assert!(!outcome.deadline_exceeded);
        assert_eq!(outcome.discarded(), 0);
        let reqs = collector.snapshot_all().counter(names::HTTP_REQS).cloned().unwrap();
        assert_eq!(reqs.total as u64, outcome.iterations());
    }
}

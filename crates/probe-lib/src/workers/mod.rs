//! Virtual worker pool
//!
//! Keeps a live population of workers sized to a ramp plan's current
//! target. Growing spawns immediately; shrinking retires the newest workers,
//! which finish their in-flight iteration before exiting. Each worker loops
//! over the iteration body and idles for a random think time in between.

mod context;

pub use context::{IterationBody, IterationContext};

use crate::error::ConfigError;
use crate::metrics::{names, MetricCollector};
use crate::models::{Sample, Tags};
use crate::observability::RunnerMetrics;
use crate::progress::ProgressRegistry;
use crate::ramp::RampPlan;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, sleep_until, timeout_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Uniformly distributed idle time between iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThinkTime {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl Default for ThinkTime {
    fn default() -> Self {
        Self {
            min: Duration::from_millis(100),
            max: Duration::from_millis(600),
        }
    }
}

impl ThinkTime {
    pub fn new(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        let think = Self { min, max };
        think.validate()?;
        Ok(think)
    }

    pub fn fixed(pause: Duration) -> Self {
        Self {
            min: pause,
            max: pause,
        }
    }

    pub fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::InvalidThinkTime {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        rng.gen_range(self.min..=self.max)
    }
}

/// Configuration for a worker pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// How often the population is re-matched to the plan
    pub poll_interval: Duration,
    pub think_time: ThinkTime,
    /// How long in-flight iterations may run after shutdown before being aborted
    pub grace_period: Duration,
    /// Seed for worker random sources; entropy when unset
    pub seed: Option<u64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            think_time: ThinkTime::default(),
            grace_period: Duration::from_secs(30),
            seed: None,
        }
    }
}

/// What a pool did over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolOutcome {
    pub iterations: u64,
    pub peak_workers: u64,
    pub spawned: u64,
    /// In-flight iterations aborted after the grace period
    pub discarded: u64,
    pub cancelled: bool,
}

/// State shared by all workers of one pool
struct WorkerShared {
    scenario: Arc<str>,
    tags: Arc<Tags>,
    body: Arc<dyn IterationBody>,
    collector: Arc<MetricCollector>,
    think_time: ThinkTime,
    iterations: AtomicU64,
    metrics: RunnerMetrics,
}

struct Worker {
    retire: CancellationToken,
    handle: JoinHandle<()>,
}

/// Population of virtual workers following one ramp plan
pub struct WorkerPool {
    scenario: Arc<str>,
    plan: RampPlan,
    tags: Tags,
    body: Arc<dyn IterationBody>,
    collector: Arc<MetricCollector>,
    config: PoolConfig,
    metrics: RunnerMetrics,
    progress: Option<ProgressRegistry>,
}

impl WorkerPool {
    pub fn new(
        scenario: impl Into<Arc<str>>,
        plan: RampPlan,
        body: Arc<dyn IterationBody>,
        collector: Arc<MetricCollector>,
        config: PoolConfig,
    ) -> Self {
        let scenario = scenario.into();
        let mut tags = Tags::new();
        tags.insert("scenario".to_string(), scenario.to_string());

        Self {
            scenario,
            plan,
            tags,
            body,
            collector,
            config,
            metrics: RunnerMetrics::new(),
            progress: None,
        }
    }

    /// Attach tags to every sample the pool's workers produce
    pub fn with_tags(mut self, tags: &Tags) -> Self {
        for (key, value) in tags {
            self.tags.insert(key.clone(), value.clone());
        }
        self
    }

    pub fn with_progress(mut self, progress: ProgressRegistry) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run until the plan's duration elapses or `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> PoolOutcome {
        let start = Instant::now();
        let deadline = start + self.plan.total_duration();
        let stop = cancel.child_token();

        let shared = Arc::new(WorkerShared {
            scenario: self.scenario.clone(),
            tags: Arc::new(self.tags.clone()),
            body: self.body.clone(),
            collector: self.collector.clone(),
            think_time: self.config.think_time,
            iterations: AtomicU64::new(0),
            metrics: self.metrics.clone(),
        });

        info!(
            scenario = %self.scenario,
            duration_secs = self.plan.total_duration().as_secs(),
            peak_target = self.plan.peak(),
            "Starting worker pool"
        );

        let mut active: Vec<Worker> = Vec::new();
        let mut retiring: Vec<JoinHandle<()>> = Vec::new();
        let mut outcome = PoolOutcome::default();
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => {
                    outcome.cancelled = true;
                    break;
                }
                _ = sleep_until(deadline) => break,
                _ = ticker.tick() => {}
            }

            let elapsed = start.elapsed();
            if elapsed >= self.plan.total_duration() {
                break;
            }

            retiring.retain(|handle| !handle.is_finished());
            self.reap_exited(&mut active);

            let target = self.plan.concurrency_at(elapsed) as usize;
            self.resize(target, &mut active, &mut retiring, &shared, &stop, &mut outcome);

            outcome.peak_workers = outcome.peak_workers.max(active.len() as u64);
            self.metrics.set_active_workers(&self.scenario, active.len());
            if let Some(progress) = &self.progress {
                progress
                    .set_workers(
                        &self.scenario,
                        active.len() as u64,
                        shared.iterations.load(Ordering::Relaxed),
                    )
                    .await;
            }
        }

        // Stop everyone: no new iterations start, in-flight ones get the grace period
        stop.cancel();
        self.record_population_change(-(active.len() as f64));
        self.metrics.set_active_workers(&self.scenario, 0);

        let handles: Vec<JoinHandle<()>> = active
            .into_iter()
            .map(|w| w.handle)
            .chain(retiring)
            .collect();
        outcome.discarded = drain(handles, self.config.grace_period).await;
        if outcome.discarded > 0 {
            self.metrics.add_discarded_iterations(outcome.discarded);
            warn!(
                scenario = %self.scenario,
                discarded = outcome.discarded,
                "Aborted workers still running after grace period"
            );
        }

        outcome.iterations = shared.iterations.load(Ordering::Relaxed);
        if let Some(progress) = &self.progress {
            progress
                .set_workers(&self.scenario, 0, outcome.iterations)
                .await;
        }

        info!(
            scenario = %self.scenario,
            iterations = outcome.iterations,
            peak_workers = outcome.peak_workers,
            cancelled = outcome.cancelled,
            "Worker pool finished"
        );

        outcome
    }

    /// Match the live population to `target`
    fn resize(
        &self,
        target: usize,
        active: &mut Vec<Worker>,
        retiring: &mut Vec<JoinHandle<()>>,
        shared: &Arc<WorkerShared>,
        stop: &CancellationToken,
        outcome: &mut PoolOutcome,
    ) {
        let before = active.len();

        while active.len() < target {
            let worker_id = outcome.spawned;
            let retire = stop.child_token();
            let rng = self.worker_rng(worker_id);
            let handle = tokio::spawn(run_worker(shared.clone(), worker_id, retire.clone(), rng));
            active.push(Worker { retire, handle });
            outcome.spawned += 1;
        }

        while active.len() > target {
            if let Some(worker) = active.pop() {
                worker.retire.cancel();
                retiring.push(worker.handle);
            }
        }

        if active.len() != before {
            debug!(
                scenario = %self.scenario,
                from = before,
                to = active.len(),
                "Resized worker population"
            );
            self.record_population_change(active.len() as f64 - before as f64);
        }
    }

    /// Drop workers whose task ended on its own (a panicking body)
    fn reap_exited(&self, active: &mut Vec<Worker>) {
        let before = active.len();
        active.retain(|w| !w.handle.is_finished());
        let lost = before - active.len();
        if lost > 0 {
            warn!(scenario = %self.scenario, lost = lost, "Workers exited unexpectedly");
            self.record_population_change(-(lost as f64));
        }
    }

    /// Gauge delta for a population change, tagged like the workers' samples
    fn population_sample(&self, delta: f64) -> Sample {
        Sample::gauge(names::VUS, delta, self.tags.clone())
    }

    fn record_population_change(&self, delta: f64) {
        if delta == 0.0 {
            return;
        }
        if let Err(e) = self.collector.record(&self.population_sample(delta)) {
            warn!(error = %e, "Failed to record worker population");
        }
    }

    fn worker_rng(&self, worker_id: u64) -> StdRng {
        match self.config.seed {
            Some(seed) => {
                let scenario_hash = self
                    .scenario
                    .bytes()
                    .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                        (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
                    });
                StdRng::seed_from_u64(
                    seed ^ scenario_hash ^ worker_id.wrapping_mul(0x9e37_79b9_7f4a_7c15),
                )
            }
            None => StdRng::from_entropy(),
        }
    }
}

/// Worker loop: iterate, record, think, until retired
async fn run_worker(
    shared: Arc<WorkerShared>,
    worker_id: u64,
    retire: CancellationToken,
    mut rng: StdRng,
) {
    let mut iteration = 0u64;

    while !retire.is_cancelled() {
        let started = Instant::now();
        let mut ctx = IterationContext::new(
            shared.scenario.clone(),
            worker_id,
            iteration,
            shared.tags.clone(),
            rng,
        );

        shared.body.iterate(&mut ctx).await;

        let (returned_rng, mut samples) = ctx.finish();
        rng = returned_rng;

        let tags = (*shared.tags).clone();
        samples.push(Sample::counter(names::ITERATIONS, 1.0, tags.clone()));
        samples.push(Sample::trend(
            names::ITERATION_DURATION,
            started.elapsed().as_secs_f64() * 1000.0,
            tags,
        ));

        if let Err(e) = shared.collector.record_all(samples.iter()) {
            warn!(scenario = %shared.scenario, worker_id, error = %e, "Failed to record samples");
        }
        shared.iterations.fetch_add(1, Ordering::Relaxed);
        shared.metrics.inc_iterations(&shared.scenario);
        iteration += 1;

        let pause = shared.think_time.sample(&mut rng);
        tokio::select! {
            _ = retire.cancelled() => break,
            _ = sleep(pause) => {}
        }
    }
}

/// Wait for workers to finish, aborting any still busy after `grace`
async fn drain(handles: Vec<JoinHandle<()>>, grace: Duration) -> u64 {
    let deadline = Instant::now() + grace;
    let mut discarded = 0;

    for mut handle in handles {
        if timeout_at(deadline, &mut handle).await.is_err() {
            handle.abort();
            discarded += 1;
        }
    }

    discarded
}

//! Concurrent metric aggregation
//!
//! The collector is shared by every worker of every scenario. Writers append
//! samples through a single short critical section on the series' map shard;
//! readers take point-in-time snapshots without blocking writers for longer
//! than one series copy.

mod series;


pub use series::{
    percentile, CounterStats, GaugeStats, RateStats, SeriesSnapshot, TrendStats,
};

use crate::error::MetricError;
use crate::models::Sample;
use dashmap::DashMap;
use serde::Serialize;
use series::Series;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Well-known metric names recorded by the workload iteration and worker pool
pub mod names {
    pub const HTTP_REQS: &str = "http_reqs";
    pub const HTTP_REQ_DURATION: &str = "http_req_duration";
    pub const HTTP_REQ_FAILED: &str = "http_req_failed";
    pub const SUCCESS_RATE: &str = "success_rate";
    pub const CHECKS: &str = "checks";
    pub const ITERATIONS: &str = "iterations";
    pub const ITERATION_DURATION: &str = "iteration_duration";
    pub const VUS: &str = "vus";
}

/// Thread-safe, append-only store of metric series keyed by name
#[derive(Debug)]
pub struct MetricCollector {
    series: DashMap<String, Series>,
    started: Instant,
}

impl Default for MetricCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCollector {
    /// Create an empty collector; elapsed time for counter rates starts now
    pub fn new() -> Self {
        Self {
            series: DashMap::new(),
            started: Instant::now(),
        }
    }

    /// Append one sample to its series, creating the series on first use
    pub fn record(&self, sample: &Sample) -> Result<(), MetricError> {
        if let Some(mut series) = self.series.get_mut(&sample.metric) {
            return apply(&sample.metric, &mut series, sample);
        }

        let mut series = self
            .series
            .entry(sample.metric.clone())
            .or_insert_with(|| Series::new(sample.kind));
        apply(&sample.metric, &mut series, sample)
    }

    /// Append all samples of one iteration
    ///
    /// Every sample is attempted; the first kind mismatch is reported.
    pub fn record_all<'a>(
        &self,
        samples: impl IntoIterator<Item = &'a Sample>,
    ) -> Result<(), MetricError> {
        let mut first_error = None;
        for sample in samples {
            if let Err(e) = self.record(sample) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Snapshot of a single series
    pub fn snapshot(&self, metric: &str) -> Option<SeriesSnapshot> {
        let elapsed = self.elapsed();
        self.series.get(metric).map(|s| s.snapshot(elapsed))
    }

    /// Snapshot of every series
    pub fn snapshot_all(&self) -> MetricsSnapshot {
        let elapsed = self.elapsed();
        let metrics = self
            .series
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot(elapsed)))
            .collect();

        MetricsSnapshot {
            elapsed_secs: elapsed.as_secs_f64(),
            metrics,
        }
    }

    /// Time since the collector was created
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.series.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

fn apply(metric: &str, series: &mut Series, sample: &Sample) -> Result<(), MetricError> {
    if series.kind() != sample.kind {
        return Err(MetricError::KindMismatch {
            metric: metric.to_string(),
            existing: series.kind(),
            attempted: sample.kind,
        });
    }
    series.record(sample.value);
    Ok(())
}

/// Point-in-time view of all series
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub elapsed_secs: f64,
    pub metrics: BTreeMap<String, SeriesSnapshot>,
}

impl MetricsSnapshot {
    pub fn get(&self, metric: &str) -> Option<&SeriesSnapshot> {
        self.metrics.get(metric)
    }

    pub fn trend(&self, metric: &str) -> Option<&TrendStats> {
        match self.metrics.get(metric) {
            Some(SeriesSnapshot::Trend(stats)) => Some(stats),
            _ => None,
        }
    }

    pub fn rate(&self, metric: &str) -> Option<&RateStats> {
        match self.metrics.get(metric) {
            Some(SeriesSnapshot::Rate(stats)) => Some(stats),
            _ => None,
        }
    }

    pub fn counter(&self, metric: &str) -> Option<&CounterStats> {
        match self.metrics.get(metric) {
            Some(SeriesSnapshot::Counter(stats)) => Some(stats),
            _ => None,
        }
    }

    pub fn gauge(&self, metric: &str) -> Option<&GaugeStats> {
        match self.metrics.get(metric) {
            Some(SeriesSnapshot::Gauge(stats)) => Some(stats),
            _ => None,
        }
    }
}

//! Periodic threshold checks while a run is live

use super::{evaluate, MissingMetricPolicy, Threshold, ThresholdResult};
use crate::metrics::MetricCollector;
use crate::observability::StructuredLogger;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Evaluates thresholds on an interval and aborts the run on a breached
/// `abortOnFail` threshold
///
/// Metrics without samples yet are skipped; early in a run that only means
/// traffic has not reached them.
pub struct ThresholdMonitor {
    thresholds: Vec<Threshold>,
    collector: Arc<MetricCollector>,
    interval: Duration,
    logger: Option<StructuredLogger>,
}

impl ThresholdMonitor {
    pub fn new(thresholds: Vec<Threshold>, collector: Arc<MetricCollector>, interval: Duration) -> Self {
        Self {
            thresholds,
            collector,
            interval,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Check until `stop` fires; cancels `abort` on an aborting breach
    ///
    /// Returns every breach observed, in order.
    pub async fn run(self, stop: CancellationToken, abort: CancellationToken) -> Vec<ThresholdResult> {
        let mut breaches = Vec::new();
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let snapshot = self.collector.snapshot_all();
            let results = evaluate(&self.thresholds, &snapshot, MissingMetricPolicy::Pass);
            debug!(checked = results.len(), "Interval threshold check");

            let mut should_abort = false;
            for result in results
                .into_iter()
                .filter(|r| !r.passed && r.observed.is_some())
            {
                if let Some(logger) = &self.logger {
                    logger.log_threshold_breach(&result, result.abort_on_fail);
                }
                should_abort |= result.abort_on_fail;
                breaches.push(result);
            }

            if should_abort {
                abort.cancel();
                break;
            }
        }

        breaches
    }
}

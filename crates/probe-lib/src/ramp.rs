//! Stage ramp planning
//!
//! Lays a scenario's stages end to end and turns them into a
//! concurrency-over-time function. Ramping executors interpolate linearly
//! between consecutive stage targets; constant executors hold flat.

use crate::error::ConfigError;
use crate::models::{ExecutorKind, Scenario};
use std::time::Duration;

/// One stage placed on the scenario timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampSegment {
    /// Offset of the segment from scenario start
    pub start: Duration,
    pub duration: Duration,
    /// Target at `start`
    pub from: u64,
    /// Target at `start + duration`
    pub to: u64,
}

impl RampSegment {
    pub fn end(&self) -> Duration {
        self.start + self.duration
    }

    /// Interpolated target `offset` into this segment, rounded to the nearest worker
    fn value_at(&self, offset: Duration) -> u64 {
        if self.from == self.to || self.duration.is_zero() {
            return self.to;
        }

        let fraction = (offset.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0);
        let from = self.from as f64;
        let to = self.to as f64;
        (from + (to - from) * fraction).round().max(0.0) as u64
    }
}

/// Concurrency-over-time function derived from a scenario
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampPlan {
    executor: ExecutorKind,
    segments: Vec<RampSegment>,
    total: Duration,
}

impl RampPlan {
    /// Build the plan for a scenario, rejecting malformed stage lists
    pub fn from_scenario(scenario: &Scenario) -> Result<Self, ConfigError> {
        scenario.validate()?;

        let segments = match scenario.executor {
            // A lone ramping stage holds its target, same as a constant executor
            ExecutorKind::ConstantConcurrency => flat(scenario),
            ExecutorKind::RampingConcurrency if scenario.stages.len() == 1 => flat(scenario),
            ExecutorKind::RampingConcurrency => {
                let mut segments = Vec::with_capacity(scenario.stages.len());
                let mut start = Duration::ZERO;
                let mut from = scenario.start_target;

                for stage in &scenario.stages {
                    segments.push(RampSegment {
                        start,
                        duration: stage.duration,
                        from,
                        to: stage.target,
                    });
                    start += stage.duration;
                    from = stage.target;
                }

                segments
            }
        };

        let total = segments.last().map(RampSegment::end).unwrap_or_default();

        Ok(Self {
            executor: scenario.executor,
            segments,
            total,
        })
    }

    /// Target concurrency `elapsed` after scenario start
    ///
    /// Past the end of the plan the final target is returned so the
    /// function stays continuous at the closing boundary.
    pub fn concurrency_at(&self, elapsed: Duration) -> u64 {
        let Some(last) = self.segments.last() else {
            return 0;
        };

        if elapsed >= self.total {
            return last.to;
        }

        let index = self
            .segments
            .partition_point(|segment| segment.end() <= elapsed);
        let segment = &self.segments[index.min(self.segments.len() - 1)];
        segment.value_at(elapsed.saturating_sub(segment.start))
    }

    pub fn total_duration(&self) -> Duration {
        self.total
    }

    pub fn executor(&self) -> ExecutorKind {
        self.executor
    }

    pub fn segments(&self) -> &[RampSegment] {
        &self.segments
    }

    /// Highest target anywhere in the plan
    pub fn peak(&self) -> u64 {
        self.segments
            .iter()
            .map(|s| s.from.max(s.to))
            .max()
            .unwrap_or(0)
    }

    /// Evaluate the plan every `step`, always including both endpoints
    pub fn sample(&self, step: Duration) -> Vec<(Duration, u64)> {
        let step = if step.is_zero() {
            Duration::from_secs(1)
        } else {
            step
        };

        let mut points = Vec::new();
        let mut t = Duration::ZERO;
        while t < self.total {
            points.push((t, self.concurrency_at(t)));
            t += step;
        }
        points.push((self.total, self.concurrency_at(self.total)));
        points
    }
}

fn flat(scenario: &Scenario) -> Vec<RampSegment> {
    let target = scenario.stages[0].target;
    vec![RampSegment {
        start: Duration::ZERO,
        duration: scenario.stages[0].duration,
        from: target,
        to: target,
    }]
}

//! Core data models for the load probe

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Key-value annotations attached to every sample a scenario produces
pub type Tags = BTreeMap<String, String>;

/// Kind of metric series a sample feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Running sum of values
    Counter,
    /// Fraction of true samples over all samples
    Rate,
    /// Full distribution of numeric observations
    Trend,
    /// Current value plus the maximum ever held
    Gauge,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Rate => "rate",
            MetricKind::Trend => "trend",
            MetricKind::Gauge => "gauge",
        };
        f.write_str(name)
    }
}

/// A single observation produced by one worker iteration
///
/// Gauge samples carry a delta that is applied to the gauge's current value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub metric: String,
    pub kind: MetricKind,
    pub value: f64,
    pub tags: Tags,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl Sample {
    pub fn new(metric: impl Into<String>, kind: MetricKind, value: f64, tags: Tags) -> Self {
        Self {
            metric: metric.into(),
            kind,
            value,
            tags,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn counter(metric: impl Into<String>, value: f64, tags: Tags) -> Self {
        Self::new(metric, MetricKind::Counter, value, tags)
    }

    pub fn rate(metric: impl Into<String>, hit: bool, tags: Tags) -> Self {
        Self::new(metric, MetricKind::Rate, if hit { 1.0 } else { 0.0 }, tags)
    }

    pub fn trend(metric: impl Into<String>, value: f64, tags: Tags) -> Self {
        Self::new(metric, MetricKind::Trend, value, tags)
    }

    pub fn gauge(metric: impl Into<String>, delta: f64, tags: Tags) -> Self {
        Self::new(metric, MetricKind::Gauge, delta, tags)
    }
}

/// How a scenario's worker population evolves over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutorKind {
    #[serde(rename = "constant-vus")]
    ConstantConcurrency,
    #[serde(rename = "ramping-vus")]
    RampingConcurrency,
}

impl fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorKind::ConstantConcurrency => f.write_str("constant-vus"),
            ExecutorKind::RampingConcurrency => f.write_str("ramping-vus"),
        }
    }
}

/// One step of a scenario's concurrency profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target: u64,
}

impl Stage {
    pub fn new(duration: Duration, target: u64) -> Self {
        Self { duration, target }
    }
}

/// Named, independently scheduled concurrency profile
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub name: String,
    pub executor: ExecutorKind,
    /// Concurrency the first ramping stage interpolates from
    pub start_target: u64,
    pub stages: Vec<Stage>,
    /// Delay from run start before the scenario's workers begin
    pub start_offset: Duration,
    pub tags: Tags,
}

impl Scenario {
    /// Constant population of `vus` workers for `duration`
    pub fn constant(name: impl Into<String>, vus: u64, duration: Duration) -> Self {
        Self {
            name: name.into(),
            executor: ExecutorKind::ConstantConcurrency,
            start_target: vus,
            stages: vec![Stage::new(duration, vus)],
            start_offset: Duration::ZERO,
            tags: Tags::new(),
        }
    }

    /// Population ramped through `stages`, starting from `start_target`
    pub fn ramping(name: impl Into<String>, start_target: u64, stages: Vec<Stage>) -> Self {
        Self {
            name: name.into(),
            executor: ExecutorKind::RampingConcurrency,
            start_target,
            stages,
            start_offset: Duration::ZERO,
            tags: Tags::new(),
        }
    }

    pub fn with_start_offset(mut self, offset: Duration) -> Self {
        self.start_offset = offset;
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sum of all stage durations
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Offset plus duration: when the scenario's last worker must be gone
    pub fn end_offset(&self) -> Duration {
        self.start_offset + self.total_duration()
    }

    /// Highest concurrency the scenario ever asks for
    pub fn peak_target(&self) -> u64 {
        self.stages
            .iter()
            .map(|s| s.target)
            .max()
            .unwrap_or(0)
            .max(match self.executor {
                ExecutorKind::RampingConcurrency if self.stages.len() > 1 => self.start_target,
                _ => 0,
            })
    }

    /// Reject malformed stage lists before anything is scheduled
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidScenario {
                scenario: self.name.clone(),
                message: "name must not be empty".to_string(),
            });
        }

        if self.stages.is_empty() {
            return Err(ConfigError::EmptyStages {
                scenario: self.name.clone(),
            });
        }

        if let Some(index) = self.stages.iter().position(|s| s.duration.is_zero()) {
            return Err(ConfigError::ZeroStageDuration {
                scenario: self.name.clone(),
                index,
            });
        }

        if self.executor == ExecutorKind::ConstantConcurrency && self.stages.len() != 1 {
            return Err(ConfigError::ConstantStageCount {
                scenario: self.name.clone(),
                found: self.stages.len(),
            });
        }

        Ok(())
    }
}

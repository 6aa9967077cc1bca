//! Rule conditions over run signals

use crate::metrics::{names, MetricsSnapshot};
use crate::thresholds::Comparison;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quantity a rule condition can compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    P95LatencyMs,
    P99LatencyMs,
    AvgLatencyMs,
    /// Fraction of failed requests, 0..1
    ErrorRate,
    /// Fraction of requests whose checks all passed, 0..1
    SuccessRate,
    PeakConcurrency,
    ThroughputRps,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::P95LatencyMs => "p95_latency_ms",
            Signal::P99LatencyMs => "p99_latency_ms",
            Signal::AvgLatencyMs => "avg_latency_ms",
            Signal::ErrorRate => "error_rate",
            Signal::SuccessRate => "success_rate",
            Signal::PeakConcurrency => "peak_concurrency",
            Signal::ThroughputRps => "throughput_rps",
        };
        f.write_str(name)
    }
}

/// Values the recommendation rules read, extracted once from the final snapshot
///
/// Signals whose metric never received a sample read as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSignals {
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub error_rate: f64,
    pub success_rate: f64,
    pub peak_concurrency: f64,
    pub throughput_rps: f64,
    pub baseline_rps: f64,
}

impl RunSignals {
    pub fn from_snapshot(snapshot: &MetricsSnapshot, baseline_rps: f64) -> Self {
        let latency = snapshot.trend(names::HTTP_REQ_DURATION);
        Self {
            p95_latency_ms: latency.map(|t| t.p95).unwrap_or(0.0),
            p99_latency_ms: latency.map(|t| t.p99).unwrap_or(0.0),
            avg_latency_ms: latency.map(|t| t.avg).unwrap_or(0.0),
            error_rate: snapshot
                .rate(names::HTTP_REQ_FAILED)
                .map(|r| r.rate)
                .unwrap_or(0.0),
            success_rate: snapshot
                .rate(names::SUCCESS_RATE)
                .map(|r| r.rate)
                .unwrap_or(0.0),
            peak_concurrency: snapshot.gauge(names::VUS).map(|g| g.max).unwrap_or(0.0),
            throughput_rps: snapshot
                .counter(names::HTTP_REQS)
                .map(|c| c.rate)
                .unwrap_or(0.0),
            baseline_rps,
        }
    }

    pub fn get(&self, signal: Signal) -> f64 {
        match signal {
            Signal::P95LatencyMs => self.p95_latency_ms,
            Signal::P99LatencyMs => self.p99_latency_ms,
            Signal::AvgLatencyMs => self.avg_latency_ms,
            Signal::ErrorRate => self.error_rate,
            Signal::SuccessRate => self.success_rate,
            Signal::PeakConcurrency => self.peak_concurrency,
            Signal::ThroughputRps => self.throughput_rps,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamedBound {
    /// The configured baseline throughput
    Baseline,
}

/// Right-hand side of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleBound {
    Value(f64),
    Named(NamedBound),
}

impl RuleBound {
    fn resolve(&self, signals: &RunSignals) -> f64 {
        match self {
            RuleBound::Value(v) => *v,
            RuleBound::Named(NamedBound::Baseline) => signals.baseline_rps,
        }
    }
}

impl From<f64> for RuleBound {
    fn from(value: f64) -> Self {
        RuleBound::Value(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unconditional {
    Always,
}

/// When a rule applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    Always(Unconditional),
    All { all: Vec<Condition> },
    Any { any: Vec<Condition> },
    Compare {
        signal: Signal,
        op: Comparison,
        value: RuleBound,
    },
}

impl Condition {
    pub fn always() -> Self {
        Condition::Always(Unconditional::Always)
    }

    pub fn compare(signal: Signal, op: Comparison, value: impl Into<RuleBound>) -> Self {
        Condition::Compare {
            signal,
            op,
            value: value.into(),
        }
    }

    pub fn all(conditions: Vec<Condition>) -> Self {
        Condition::All { all: conditions }
    }

    pub fn any(conditions: Vec<Condition>) -> Self {
        Condition::Any { any: conditions }
    }

    pub fn is_always(&self) -> bool {
        matches!(self, Condition::Always(_))
    }

    pub fn matches(&self, signals: &RunSignals) -> bool {
        match self {
            Condition::Always(_) => true,
            Condition::All { all } => all.iter().all(|c| c.matches(signals)),
            Condition::Any { any } => any.iter().any(|c| c.matches(signals)),
            Condition::Compare { signal, op, value } => {
                op.holds(signals.get(*signal), value.resolve(signals))
            }
        }
    }
}

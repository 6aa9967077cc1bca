//! Threshold evaluation
//!
//! Thresholds are pass/fail predicates over a metrics snapshot. Evaluation
//! is a pure function of the snapshot; a threshold whose metric never
//! received a sample resolves according to [`MissingMetricPolicy`].

mod expression;
mod monitor;

pub use expression::{Aggregation, Comparison, ThresholdExpr};
pub use monitor::ThresholdMonitor;

use crate::error::ConfigError;
use crate::metrics::{MetricsSnapshot, SeriesSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a threshold over a metric without samples resolves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingMetricPolicy {
    /// An absent signal cannot certify compliance
    #[default]
    Fail,
    Pass,
}

/// Threshold entry as written in a profile: a bare expression or an object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdSpec {
    Expression(String),
    Detailed {
        threshold: String,
        #[serde(default, alias = "abortOnFail")]
        abort_on_fail: bool,
    },
}

impl ThresholdSpec {
    pub fn expression(&self) -> &str {
        match self {
            ThresholdSpec::Expression(expression) => expression,
            ThresholdSpec::Detailed { threshold, .. } => threshold,
        }
    }

    pub fn abort_on_fail(&self) -> bool {
        matches!(
            self,
            ThresholdSpec::Detailed {
                abort_on_fail: true,
                ..
            }
        )
    }
}

/// A parsed threshold bound to one metric
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: String,
    pub expression: String,
    pub expr: ThresholdExpr,
    /// Cancel the run when this threshold is breached during interval checks
    pub abort_on_fail: bool,
}

impl Threshold {
    pub fn parse(metric: impl Into<String>, expression: &str) -> Result<Self, ConfigError> {
        let metric = metric.into();
        let expr = expression
            .parse::<ThresholdExpr>()
            .map_err(|message| ConfigError::InvalidThreshold {
                metric: metric.clone(),
                expression: expression.to_string(),
                message,
            })?;

        Ok(Self {
            metric,
            expression: expression.trim().to_string(),
            expr,
            abort_on_fail: false,
        })
    }

    pub fn with_abort_on_fail(mut self, abort: bool) -> Self {
        self.abort_on_fail = abort;
        self
    }

    /// Parse a profile's `metric -> [entries]` map
    pub fn from_specs(specs: &BTreeMap<String, Vec<ThresholdSpec>>) -> Result<Vec<Self>, ConfigError> {
        let mut thresholds = Vec::new();
        for (metric, entries) in specs {
            for entry in entries {
                thresholds.push(
                    Threshold::parse(metric.as_str(), entry.expression())?
                        .with_abort_on_fail(entry.abort_on_fail()),
                );
            }
        }
        Ok(thresholds)
    }

    /// Evaluate against a snapshot
    pub fn evaluate(&self, snapshot: &MetricsSnapshot, policy: MissingMetricPolicy) -> ThresholdResult {
        let observed = match snapshot.get(&self.metric) {
            Some(series) if has_samples(series) => observe(series, self.expr.aggregation),
            _ => {
                let passed = policy == MissingMetricPolicy::Pass;
                return self.result(None, passed, Some("metric has no samples".to_string()));
            }
        };

        match observed {
            Ok(value) => {
                let passed = self.expr.holds(value);
                let reason = (!passed).then(|| {
                    format!(
                        "observed {} {} {} does not hold",
                        format_value(value),
                        self.expr.op,
                        self.expr.bound
                    )
                });
                self.result(Some(value), passed, reason)
            }
            Err(reason) => self.result(None, false, Some(reason)),
        }
    }

    fn result(&self, observed: Option<f64>, passed: bool, reason: Option<String>) -> ThresholdResult {
        ThresholdResult {
            metric: self.metric.clone(),
            expression: self.expression.clone(),
            observed,
            passed,
            abort_on_fail: self.abort_on_fail,
            reason,
        }
    }
}

/// Outcome of one threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
    #[serde(default)]
    pub abort_on_fail: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Evaluate every threshold against one snapshot
pub fn evaluate(
    thresholds: &[Threshold],
    snapshot: &MetricsSnapshot,
    policy: MissingMetricPolicy,
) -> Vec<ThresholdResult> {
    thresholds
        .iter()
        .map(|t| t.evaluate(snapshot, policy))
        .collect()
}

/// Passed and failed counts over a result list
pub fn tally(results: &[ThresholdResult]) -> (usize, usize) {
    let passed = results.iter().filter(|r| r.passed).count();
    (passed, results.len() - passed)
}

fn has_samples(series: &SeriesSnapshot) -> bool {
    match series {
        SeriesSnapshot::Counter(stats) => stats.samples > 0,
        SeriesSnapshot::Rate(stats) => stats.total() > 0,
        SeriesSnapshot::Trend(stats) => stats.count > 0,
        SeriesSnapshot::Gauge(_) => true,
    }
}

fn observe(series: &SeriesSnapshot, aggregation: Aggregation) -> Result<f64, String> {
    let value = match (series, aggregation) {
        (SeriesSnapshot::Trend(t), Aggregation::Avg) => t.avg,
        (SeriesSnapshot::Trend(t), Aggregation::Min) => t.min,
        (SeriesSnapshot::Trend(t), Aggregation::Max) => t.max,
        (SeriesSnapshot::Trend(t), Aggregation::Med) => t.med,
        (SeriesSnapshot::Trend(t), Aggregation::Percentile(p)) => t.percentile(p),
        (SeriesSnapshot::Trend(t), Aggregation::Count) => t.count as f64,
        (SeriesSnapshot::Rate(r), Aggregation::Rate) => r.rate,
        (SeriesSnapshot::Counter(c), Aggregation::Count) => c.total,
        (SeriesSnapshot::Counter(c), Aggregation::Rate) => c.rate,
        (SeriesSnapshot::Gauge(g), Aggregation::Value) => g.value,
        (SeriesSnapshot::Gauge(g), Aggregation::Max) => g.max,
        (series, aggregation) => {
            return Err(format!(
                "`{}` does not apply to a {} series",
                aggregation,
                series.kind()
            ))
        }
    };
    Ok(value)
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.4}", value)
    }
}

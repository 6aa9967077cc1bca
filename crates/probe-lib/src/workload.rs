//! Workload catalog and the iteration body that drives it
//!
//! Each iteration either picks one operation uniformly at random or runs
//! the whole catalog in order. Every request yields the standard request
//! samples; checks decide whether it counts as a success.

use crate::error::ConfigError;
use crate::metrics::names;
use crate::models::Sample;
use crate::observability::RunnerMetrics;
use crate::protocol::{InvokeOutcome, ProtocolClient};
use crate::workers::{IterationBody, IterationContext};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Status codes an operation accepts: a single code or an inclusive range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExpectedStatus {
    Code(u16),
    Range { from: u16, to: u16 },
}

impl ExpectedStatus {
    pub fn contains(&self, status: u16) -> bool {
        match self {
            ExpectedStatus::Code(code) => *code == status,
            ExpectedStatus::Range { from, to } => (*from..=*to).contains(&status),
        }
    }
}

fn default_expected_status() -> Vec<ExpectedStatus> {
    vec![ExpectedStatus::Range { from: 200, to: 399 }]
}

/// One candidate request in the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub method: HttpMethod,
    /// Path, with optional query, relative to the service URL
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    #[serde(default = "default_expected_status", alias = "expectedStatus")]
    pub expected_status: Vec<ExpectedStatus>,
    /// Extra check: the response must arrive within this latency
    #[serde(
        default,
        alias = "maxLatency",
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_latency: Option<Duration>,
    /// Extra check: the response must carry a body
    #[serde(default, alias = "requireBody")]
    pub require_body: bool,
}

impl Operation {
    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
            expected_status: default_expected_status(),
            max_latency: None,
            require_body: false,
        }
    }

    pub fn status_ok(&self, status: u16) -> bool {
        self.expected_status.iter().any(|s| s.contains(status))
    }

    /// Named check results for one outcome, status check first
    pub fn checks(&self, outcome: &InvokeOutcome) -> Vec<(String, bool)> {
        let mut checks = vec![(
            format!("{} status", self.name),
            outcome.status.map(|s| self.status_ok(s)).unwrap_or(false),
        )];
        if let Some(limit) = self.max_latency {
            checks.push((
                format!("{} response time < {}ms", self.name, limit.as_millis()),
                outcome.status.is_some() && outcome.duration < limit,
            ));
        }
        if self.require_body {
            checks.push((format!("{} has body", self.name), outcome.body_present));
        }
        checks
    }
}

/// How an iteration chooses operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Selection {
    /// One operation chosen uniformly at random
    #[default]
    Random,
    /// Every operation, in catalog order
    All,
}

/// Ordered set of operations an iteration draws from
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadCatalog {
    operations: Vec<Operation>,
    selection: Selection,
}

impl WorkloadCatalog {
    pub fn new(operations: Vec<Operation>, selection: Selection) -> Result<Self, ConfigError> {
        if operations.is_empty() {
            return Err(ConfigError::InvalidWorkload(
                "at least one operation is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for op in &operations {
            if op.name.trim().is_empty() {
                return Err(ConfigError::InvalidWorkload(format!(
                    "operation for `{}` has no name",
                    op.path
                )));
            }
            if !seen.insert(op.name.as_str()) {
                return Err(ConfigError::InvalidWorkload(format!(
                    "duplicate operation name `{}`",
                    op.name
                )));
            }
            if !op.path.starts_with('/') {
                return Err(ConfigError::InvalidWorkload(format!(
                    "operation `{}` path must start with `/`",
                    op.name
                )));
            }
            if op.expected_status.is_empty() {
                return Err(ConfigError::InvalidWorkload(format!(
                    "operation `{}` accepts no status",
                    op.name
                )));
            }
            if let Some(ExpectedStatus::Range { from, to }) = op
                .expected_status
                .iter()
                .find(|s| matches!(s, ExpectedStatus::Range { from, to } if from > to))
            {
                return Err(ConfigError::InvalidWorkload(format!(
                    "operation `{}` has an empty status range {}-{}",
                    op.name, from, to
                )));
            }
        }

        Ok(Self {
            operations,
            selection,
        })
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Indices of the operations one iteration runs
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Vec<usize> {
        match self.selection {
            Selection::Random => vec![rng.gen_range(0..self.operations.len())],
            Selection::All => (0..self.operations.len()).collect(),
        }
    }
}

/// Iteration body issuing catalog operations through a protocol client
pub struct CatalogIteration {
    catalog: Arc<WorkloadCatalog>,
    client: Arc<dyn ProtocolClient>,
    metrics: RunnerMetrics,
}

impl CatalogIteration {
    pub fn new(catalog: Arc<WorkloadCatalog>, client: Arc<dyn ProtocolClient>) -> Self {
        Self {
            catalog,
            client,
            metrics: RunnerMetrics::new(),
        }
    }
}

#[async_trait]
impl IterationBody for CatalogIteration {
    async fn iterate(&self, ctx: &mut IterationContext) {
        let picks = self.catalog.pick(ctx.rng());

        for index in picks {
            let operation = &self.catalog.operations()[index];
            let outcome = self.client.invoke(operation).await;
            record_request(ctx, operation, &outcome);

            let failed = outcome.status.map(|s| !operation.status_ok(s)).unwrap_or(true);
            self.metrics.observe_request(outcome.duration, failed);
        }
    }
}

/// Standard per-request samples
fn record_request(ctx: &mut IterationContext, operation: &Operation, outcome: &InvokeOutcome) {
    let status = outcome
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "0".to_string());
    let method = operation.method.to_string();
    let tags = ctx.tags_with(&[
        ("endpoint", operation.name.as_str()),
        ("method", method.as_str()),
        ("status", status.as_str()),
    ]);

    let status_ok = outcome.status.map(|s| operation.status_ok(s)).unwrap_or(false);
    let checks = operation.checks(outcome);
    let all_passed = checks.iter().all(|(_, passed)| *passed);

    ctx.push(Sample::counter(names::HTTP_REQS, 1.0, tags.clone()));
    ctx.push(Sample::trend(names::HTTP_REQ_DURATION, outcome.duration_ms(), tags.clone()));
    ctx.push(Sample::rate(names::HTTP_REQ_FAILED, !status_ok, tags.clone()));
    for (name, passed) in checks {
        let mut check_tags = tags.clone();
        check_tags.insert("check".to_string(), name);
        ctx.push(Sample::rate(names::CHECKS, passed, check_tags));
    }
    ctx.push(Sample::rate(names::SUCCESS_RATE, all_passed, tags));
}

//! Scaling recommendation engine
//!
//! A rule table is an ordered list of `(condition -> action, replicas)`.
//! The first rule whose condition matches the run signals decides; the
//! last rule is unconditional, so every run gets a recommendation.

mod profiles;
mod rules;

pub use profiles::{builtin, BUILTIN_PROFILES};
pub use rules::{Condition, NamedBound, RuleBound, RunSignals, Signal, Unconditional};

use crate::error::ConfigError;
use crate::metrics::MetricsSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scaling direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScalingAction {
    #[serde(alias = "scale_up")]
    ScaleUp,
    #[serde(alias = "scale_down")]
    ScaleDown,
    #[serde(alias = "maintain")]
    Maintain,
}

impl fmt::Display for ScalingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingAction::ScaleUp => f.write_str("SCALE_UP"),
            ScalingAction::ScaleDown => f.write_str("SCALE_DOWN"),
            ScalingAction::Maintain => f.write_str("MAINTAIN"),
        }
    }
}

/// One row of a rule table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRule {
    pub name: String,
    pub when: Condition,
    pub action: ScalingAction,
    pub replicas: u32,
    /// Template; see [`render_reason`] for placeholders
    #[serde(default)]
    pub reason: String,
}

impl RecommendationRule {
    pub fn new(
        name: impl Into<String>,
        when: Condition,
        action: ScalingAction,
        replicas: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            when,
            action,
            replicas,
            reason: reason.into(),
        }
    }
}

/// Decision produced for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: ScalingAction,
    pub replicas: u32,
    pub reason: String,
    /// Name of the rule that matched
    pub rule: String,
}

/// Validated, ordered rule table
#[derive(Debug, Clone, PartialEq)]
pub struct RuleTable {
    name: String,
    rules: Vec<RecommendationRule>,
}

impl RuleTable {
    pub fn new(name: impl Into<String>, rules: Vec<RecommendationRule>) -> Result<Self, ConfigError> {
        let name = name.into();
        let invalid = |message: &str| ConfigError::InvalidRuleTable {
            table: name.clone(),
            message: message.to_string(),
        };

        let last = rules.last().ok_or_else(|| invalid("no rules defined"))?;
        if !last.when.is_always() {
            return Err(invalid("last rule must be unconditional (`always`)"));
        }
        if let Some(rule) = rules.iter().find(|r| r.replicas == 0) {
            return Err(invalid(&format!("rule `{}` recommends zero replicas", rule.name)));
        }
        if let Some(rule) = rules.iter().find(|r| r.name.trim().is_empty()) {
            return Err(invalid(&format!(
                "rule recommending {} has no name",
                rule.action
            )));
        }

        Ok(Self { name, rules })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &[RecommendationRule] {
        &self.rules
    }

    /// First matching rule decides
    pub fn recommend(&self, signals: &RunSignals) -> Recommendation {
        // The fallback guarantees a match; the table is never empty
        let rule = self
            .rules
            .iter()
            .find(|r| r.when.matches(signals))
            .unwrap_or(&self.rules[self.rules.len() - 1]);

        Recommendation {
            action: rule.action,
            replicas: rule.replicas,
            reason: render_reason(&rule.reason, signals),
            rule: rule.name.clone(),
        }
    }

    pub fn recommend_snapshot(&self, snapshot: &MetricsSnapshot, baseline_rps: f64) -> Recommendation {
        self.recommend(&RunSignals::from_snapshot(snapshot, baseline_rps))
    }
}

/// Fill a reason template
///
/// Placeholders: `{p95}`, `{p99}`, `{avg}` (ms), `{error_rate}`,
/// `{success_rate}` (percent), `{throughput}`, `{baseline}` (req/s),
/// `{vus_max}`.
pub fn render_reason(template: &str, signals: &RunSignals) -> String {
    let replacements = [
        ("{p95}", format!("{:.0}", signals.p95_latency_ms)),
        ("{p99}", format!("{:.0}", signals.p99_latency_ms)),
        ("{avg}", format!("{:.2}", signals.avg_latency_ms)),
        ("{error_rate}", format!("{:.1}", signals.error_rate * 100.0)),
        ("{success_rate}", format!("{:.2}", signals.success_rate * 100.0)),
        ("{throughput}", format!("{:.2}", signals.throughput_rps)),
        ("{baseline}", format!("{:.0}", signals.baseline_rps)),
        ("{vus_max}", format!("{:.0}", signals.peak_concurrency)),
    ];

    replacements
        .iter()
        .fold(template.to_string(), |text, (placeholder, value)| {
            text.replace(placeholder, value)
        })
}

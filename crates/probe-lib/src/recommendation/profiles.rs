//! Built-in rule tables

use super::rules::{Condition, NamedBound, RuleBound, Signal};
use super::{RecommendationRule, RuleTable, ScalingAction};
use crate::error::ConfigError;
use crate::thresholds::Comparison;

/// Names accepted by [`builtin`]
pub const BUILTIN_PROFILES: &[&str] = &["default", "lendings", "books", "quick"];

/// Look up a built-in rule table by name
pub fn builtin(name: &str) -> Result<RuleTable, ConfigError> {
    let rules = match name {
        "default" => vec![
            low_success_rate(),
            high_avg_latency(),
            low_throughput(),
            critical_latency_or_errors(),
            elevated_latency_or_errors(),
            idle_capacity(),
            healthy(),
            fallback(ScalingAction::Maintain, 2),
        ],
        "lendings" => vec![
            critical_latency_or_errors(),
            elevated_latency_or_errors(),
            idle_capacity(),
            fallback(ScalingAction::Maintain, 2),
        ],
        "books" => vec![
            low_success_rate(),
            high_avg_latency(),
            low_throughput(),
            healthy(),
            fallback(ScalingAction::Maintain, 1),
        ],
        "quick" => vec![
            critical_latency_or_errors(),
            elevated_latency_or_errors(),
            RecommendationRule::new(
                "fast_and_clean",
                Condition::all(vec![
                    Condition::compare(Signal::P95LatencyMs, Comparison::Lt, 500.0),
                    Condition::compare(Signal::ErrorRate, Comparison::Lt, 0.01),
                ]),
                ScalingAction::ScaleDown,
                1,
                "Low latency (p95: {p95}ms) with error rate {error_rate}%",
            ),
            fallback(ScalingAction::Maintain, 2),
        ],
        other => return Err(ConfigError::UnknownRuleProfile(other.to_string())),
    };

    RuleTable::new(name, rules)
}

fn low_success_rate() -> RecommendationRule {
    RecommendationRule::new(
        "low_success_rate",
        Condition::compare(Signal::SuccessRate, Comparison::Lt, 0.95),
        ScalingAction::ScaleUp,
        3,
        "Success rate {success_rate}% is below 95%",
    )
}

fn high_avg_latency() -> RecommendationRule {
    RecommendationRule::new(
        "high_avg_latency",
        Condition::compare(Signal::AvgLatencyMs, Comparison::Gt, 500.0),
        ScalingAction::ScaleUp,
        2,
        "Average latency {avg}ms exceeds 500ms",
    )
}

fn low_throughput() -> RecommendationRule {
    RecommendationRule::new(
        "low_throughput",
        Condition::compare(
            Signal::ThroughputRps,
            Comparison::Lt,
            RuleBound::Named(NamedBound::Baseline),
        ),
        ScalingAction::ScaleUp,
        2,
        "Throughput {throughput} req/s is below the {baseline} req/s baseline",
    )
}

fn critical_latency_or_errors() -> RecommendationRule {
    RecommendationRule::new(
        "critical_latency_or_errors",
        Condition::any(vec![
            Condition::compare(Signal::P95LatencyMs, Comparison::Gt, 3000.0),
            Condition::compare(Signal::ErrorRate, Comparison::Gt, 0.15),
        ]),
        ScalingAction::ScaleUp,
        4,
        "High latency (p95: {p95}ms) or error rate ({error_rate}%)",
    )
}

fn elevated_latency_or_errors() -> RecommendationRule {
    RecommendationRule::new(
        "elevated_latency_or_errors",
        Condition::any(vec![
            Condition::compare(Signal::P95LatencyMs, Comparison::Gt, 2000.0),
            Condition::compare(Signal::ErrorRate, Comparison::Gt, 0.08),
        ]),
        ScalingAction::ScaleUp,
        3,
        "Moderate latency (p95: {p95}ms) or error rate ({error_rate}%)",
    )
}

fn idle_capacity() -> RecommendationRule {
    RecommendationRule::new(
        "idle_capacity",
        Condition::all(vec![
            Condition::compare(Signal::P95LatencyMs, Comparison::Lt, 500.0),
            Condition::compare(Signal::ErrorRate, Comparison::Lt, 0.01),
            Condition::compare(Signal::PeakConcurrency, Comparison::Lt, 20.0),
        ]),
        ScalingAction::ScaleDown,
        1,
        "Low latency (p95: {p95}ms) and minimal load ({vus_max} workers)",
    )
}

fn healthy() -> RecommendationRule {
    RecommendationRule::new(
        "healthy",
        Condition::all(vec![
            Condition::compare(Signal::SuccessRate, Comparison::Ge, 0.99),
            Condition::compare(Signal::AvgLatencyMs, Comparison::Lt, 100.0),
        ]),
        ScalingAction::Maintain,
        1,
        "Success rate {success_rate}% with average latency {avg}ms",
    )
}

fn fallback(action: ScalingAction, replicas: u32) -> RecommendationRule {
    RecommendationRule::new(
        "fallback",
        Condition::always(),
        action,
        replicas,
        "Performance within acceptable thresholds",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_builtin_is_valid() {
        for name in BUILTIN_PROFILES {
            let table = builtin(name).unwrap();
            assert_eq!(table.name(), *name);
            assert!(table.rules().last().unwrap().when.is_always());
        }
    }

    #[test]
    fn test_unknown_profile() {
        assert!(matches!(
            builtin("catalog"),
            Err(ConfigError::UnknownRuleProfile(name)) if name == "catalog"
        ));
    }

    #[test]
    fn test_default_follows_documented_order() {
        let table = builtin("default").unwrap();
        let names: Vec<&str> = table.rules().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "low_success_rate",
                "high_avg_latency",
                "low_throughput",
                "critical_latency_or_errors",
                "elevated_latency_or_errors",
                "idle_capacity",
                "healthy",
                "fallback",
            ]
        );
    }
}

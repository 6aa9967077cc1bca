//! Error types for the probe library
//!
//! Configuration problems are fatal and surface before a run starts.
//! Failed requests are never errors; they are recorded as samples.

use crate::models::MetricKind;
use std::time::Duration;
use thiserror::Error;

/// Malformed scenario, threshold, rule or workload definitions.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no scenarios defined")]
    NoScenarios,

    #[error("duplicate scenario name `{0}`")]
    DuplicateScenario(String),

    #[error("scenario `{scenario}` has no stages")]
    EmptyStages { scenario: String },

    #[error("scenario `{scenario}` stage {index} has a zero duration")]
    ZeroStageDuration { scenario: String, index: usize },

    #[error("constant-vus scenario `{scenario}` needs exactly one stage, found {found}")]
    ConstantStageCount { scenario: String, found: usize },

    #[error("scenario `{scenario}`: {message}")]
    InvalidScenario { scenario: String, message: String },

    #[error("invalid threshold `{expression}` on `{metric}`: {message}")]
    InvalidThreshold {
        metric: String,
        expression: String,
        message: String,
    },

    #[error("rule table `{table}`: {message}")]
    InvalidRuleTable { table: String, message: String },

    #[error("unknown rule profile `{0}`")]
    UnknownRuleProfile(String),

    #[error("workload catalog: {0}")]
    InvalidWorkload(String),

    #[error("think time minimum {min:?} exceeds maximum {max:?}")]
    InvalidThinkTime { min: Duration, max: Duration },

    #[error("invalid setting `{field}`: {message}")]
    InvalidSetting { field: &'static str, message: String },

    #[error("failed to read profile `{path}`: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile `{path}`: {message}")]
    Parse { path: String, message: String },

    #[error("unsupported profile format `{0}`, expected .toml, .yaml, .yml or .json")]
    UnsupportedFormat(String),

    #[error("failed to read environment overrides: {0}")]
    Load(#[from] config::ConfigError),
}

/// Errors raised by the metric collector.
#[derive(Debug, Error)]
pub enum MetricError {
    #[error("metric `{metric}` holds a {existing} series, cannot record a {attempted} sample")]
    KindMismatch {
        metric: String,
        existing: MetricKind,
        attempted: MetricKind,
    },
}

/// Errors raised while constructing a protocol client.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid service URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

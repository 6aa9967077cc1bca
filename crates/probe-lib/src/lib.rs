//! Capacity probe library
//!
//! This crate provides the core functionality for:
//! - Load scenarios and their worker ramp schedules
//! - Virtual worker pools and scenario scheduling
//! - Metric collection and aggregation
//! - Threshold evaluation and scaling recommendations
//! - Test profiles, run orchestration and the final report

pub mod error;
pub mod metrics;
pub mod models;
pub mod observability;
pub mod profile;
pub mod progress;
pub mod protocol;
pub mod ramp;
pub mod recommendation;
pub mod report;
pub mod run;
pub mod scheduler;
pub mod thresholds;
pub mod workers;
pub mod workload;

pub use error::{ConfigError, MetricError, ProtocolError};
pub use models::*;
pub use observability::{RunnerMetrics, StructuredLogger};
pub use profile::{TestPlan, TestProfile};
pub use progress::{ProgressRegistry, RunProgress, ScenarioPhase, ScenarioProgress};
pub use recommendation::{Recommendation, RuleTable, RunSignals, ScalingAction};
pub use report::RunReport;
pub use run::LoadTest;

//! Run progress tracking
//!
//! Tracks the lifecycle phase and live worker count of every scenario so the
//! runner can report progress while a test is in flight.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Lifecycle phase of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioPhase {
    /// Waiting for its start offset
    Pending,
    /// Workers are live
    Running,
    /// Ran its full duration
    Completed,
    /// Stopped early by cancellation or the run deadline
    Cancelled,
}

impl ScenarioPhase {
    pub fn is_finished(&self) -> bool {
        matches!(self, ScenarioPhase::Completed | ScenarioPhase::Cancelled)
    }
}

/// Progress of a single scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioProgress {
    pub phase: ScenarioPhase,
    pub active_workers: u64,
    pub iterations: u64,
    pub updated_at: i64,
}

impl ScenarioProgress {
    fn pending() -> Self {
        Self {
            phase: ScenarioPhase::Pending,
            active_workers: 0,
            iterations: 0,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Overall progress response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunProgress {
    pub phase: ScenarioPhase,
    pub active_workers: u64,
    pub scenarios: BTreeMap<String, ScenarioProgress>,
}

impl RunProgress {
    /// Overall phase: running while anything runs, cancelled if any scenario was
    pub fn compute_phase(scenarios: &BTreeMap<String, ScenarioProgress>) -> ScenarioPhase {
        if scenarios.is_empty() {
            return ScenarioPhase::Pending;
        }

        let mut any_cancelled = false;
        let mut any_pending = false;
        for progress in scenarios.values() {
            match progress.phase {
                ScenarioPhase::Running => return ScenarioPhase::Running,
                ScenarioPhase::Pending => any_pending = true,
                ScenarioPhase::Cancelled => any_cancelled = true,
                ScenarioPhase::Completed => {}
            }
        }

        let all_pending = scenarios
            .values()
            .all(|p| p.phase == ScenarioPhase::Pending);

        if all_pending {
            ScenarioPhase::Pending
        } else if any_pending {
            // Some finished, some still waiting on their offset
            ScenarioPhase::Running
        } else if any_cancelled {
            ScenarioPhase::Cancelled
        } else {
            ScenarioPhase::Completed
        }
    }
}

/// Registry of scenario progress shared between scheduler and status API
#[derive(Debug, Clone, Default)]
pub struct ProgressRegistry {
    scenarios: Arc<RwLock<BTreeMap<String, ScenarioProgress>>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scenario in the pending phase
    pub async fn register(&self, scenario: &str) {
        let mut scenarios = self.scenarios.write().await;
        scenarios.insert(scenario.to_string(), ScenarioProgress::pending());
    }

    pub async fn set_phase(&self, scenario: &str, phase: ScenarioPhase) {
        let mut scenarios = self.scenarios.write().await;
        let entry = scenarios
            .entry(scenario.to_string())
            .or_insert_with(ScenarioProgress::pending);
        entry.phase = phase;
        if phase.is_finished() {
            entry.active_workers = 0;
        }
        entry.updated_at = chrono::Utc::now().timestamp();
    }

    pub async fn set_workers(&self, scenario: &str, active_workers: u64, iterations: u64) {
        let mut scenarios = self.scenarios.write().await;
        if let Some(entry) = scenarios.get_mut(scenario) {
            entry.active_workers = active_workers;
            entry.iterations = iterations;
            entry.updated_at = chrono::Utc::now().timestamp();
        }
    }

    pub async fn progress(&self) -> RunProgress {
        let scenarios = self.scenarios.read().await.clone();
        let phase = RunProgress::compute_phase(&scenarios);
        let active_workers = scenarios.values().map(|p| p.active_workers).sum();
        RunProgress {
            phase,
            active_workers,
            scenarios,
        }
    }
}

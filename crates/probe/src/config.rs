//! Runner configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Runner configuration, read from `RUNNER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    /// Test profile to execute
    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,

    /// API server port for health/progress/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Where the JSON report is written
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,
}

fn default_profile_path() -> PathBuf {
    PathBuf::from("profile.toml")
}

fn default_api_port() -> u16 {
    9464
}

fn default_output_path() -> PathBuf {
    PathBuf::from("load-test-results.json")
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            profile_path: default_profile_path(),
            api_port: default_api_port(),
            output_path: default_output_path(),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("RUNNER").try_parsing(true))
            .build()
            .context("Failed to read runner environment")?;

        config
            .try_deserialize()
            .context("Invalid runner configuration")
    }
}

//! Test profile: the configuration source for a run
//!
//! A profile file (TOML, YAML or JSON, chosen by extension) is merged with
//! environment overrides (`PROBE__SERVICE_URL`, `PROBE__BASELINE_RPS`, ...)
//! and validated into a [`TestPlan`] before anything is scheduled.

use crate::error::ConfigError;
use crate::models::{Scenario, Stage, Tags};
use crate::recommendation::{builtin, RecommendationRule, RuleTable};
use crate::thresholds::{MissingMetricPolicy, Threshold, ThresholdSpec};
use crate::workers::{PoolConfig, ThinkTime};
use crate::workload::{Operation, Selection, WorkloadCatalog};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Environment prefix for profile overrides
pub const ENV_PREFIX: &str = "PROBE";

/// Scenario as declared in a profile, k6 style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "executor")]
pub enum ScenarioSpec {
    #[serde(rename = "constant-vus")]
    Constant {
        vus: u64,
        #[serde(with = "humantime_serde")]
        duration: Duration,
        #[serde(default, alias = "startTime", with = "humantime_serde")]
        start_time: Duration,
        #[serde(default)]
        tags: Tags,
    },
    #[serde(rename = "ramping-vus")]
    Ramping {
        #[serde(default, alias = "startVUs")]
        start_vus: u64,
        stages: Vec<Stage>,
        #[serde(default, alias = "startTime", with = "humantime_serde")]
        start_time: Duration,
        #[serde(default)]
        tags: Tags,
    },
}

impl ScenarioSpec {
    pub fn to_scenario(&self, name: &str) -> Scenario {
        let (scenario, start_time, tags) = match self {
            ScenarioSpec::Constant {
                vus,
                duration,
                start_time,
                tags,
            } => (Scenario::constant(name, *vus, *duration), start_time, tags),
            ScenarioSpec::Ramping {
                start_vus,
                stages,
                start_time,
                tags,
            } => (
                Scenario::ramping(name, *start_vus, stages.clone()),
                start_time,
                tags,
            ),
        };

        tags.iter().fold(
            scenario.with_start_offset(*start_time),
            |scenario, (key, value)| scenario.with_tag(key.as_str(), value.as_str()),
        )
    }
}

/// Rule table selection: a built-in profile name or a custom list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RulesSpec {
    Builtin(String),
    Custom(Vec<RecommendationRule>),
}

impl Default for RulesSpec {
    fn default() -> Self {
        RulesSpec::Builtin("default".to_string())
    }
}

impl RulesSpec {
    pub fn resolve(&self) -> Result<RuleTable, ConfigError> {
        match self {
            RulesSpec::Builtin(name) => builtin(name),
            RulesSpec::Custom(rules) => RuleTable::new("custom", rules.clone()),
        }
    }
}

/// Raw profile as read from file and environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestProfile {
    #[serde(alias = "serviceUrl")]
    pub service_url: String,

    /// Label carried on every log event and the report
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Throughput the run is compared against, requests per second
    #[serde(default = "default_baseline_rps", alias = "baselineRps")]
    pub baseline_rps: f64,

    #[serde(default)]
    pub seed: Option<u64>,

    /// Path probed once before the run; failures only warn
    #[serde(default, alias = "healthPath")]
    pub health_path: Option<String>,

    #[serde(default = "default_poll_interval", alias = "pollInterval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default = "default_grace_period", alias = "gracePeriod", with = "humantime_serde")]
    pub grace_period: Duration,

    /// Run-wide budget; scenarios still running when it expires are cancelled
    #[serde(default, alias = "maxDuration", with = "humantime_serde")]
    pub max_duration: Option<Duration>,

    #[serde(default = "default_request_timeout", alias = "requestTimeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    #[serde(default, alias = "thinkTime")]
    pub think_time: ThinkTime,

    #[serde(default)]
    pub selection: Selection,

    pub workload: Vec<Operation>,

    pub scenarios: BTreeMap<String, ScenarioSpec>,

    #[serde(default)]
    pub thresholds: BTreeMap<String, Vec<ThresholdSpec>>,

    #[serde(default, alias = "thresholdCheckInterval", with = "humantime_serde")]
    pub threshold_check_interval: Option<Duration>,

    #[serde(default, alias = "missingMetric")]
    pub missing_metric: MissingMetricPolicy,

    #[serde(default)]
    pub rules: RulesSpec,
}

fn default_environment() -> String {
    "staging".to_string()
}

fn default_baseline_rps() -> f64 {
    50.0
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_grace_period() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

impl TestProfile {
    /// Load a profile file with `PROBE__*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load a profile file with overrides under a custom environment prefix
    ///
    /// The file is parsed as written so k6 camelCase keys and scenario names
    /// keep their case. Overrides arrive lowercased from the environment and
    /// replace the file entry whose key matches ignoring case and underscores.
    pub fn load_with_prefix(path: impl AsRef<Path>, prefix: &str) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut document = read_document(path)?;

        let overrides: Value = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        merge_overrides(&mut document, overrides);

        serde_json::from_value(document).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Validate everything and resolve the run plan
    pub fn plan(&self) -> Result<TestPlan, ConfigError> {
        Url::parse(&self.service_url).map_err(|e| ConfigError::InvalidSetting {
            field: "service_url",
            message: format!("`{}`: {}", self.service_url, e),
        })?;

        if !self.baseline_rps.is_finite() || self.baseline_rps < 0.0 {
            return Err(ConfigError::InvalidSetting {
                field: "baseline_rps",
                message: format!("must be a non-negative number, got {}", self.baseline_rps),
            });
        }
        for (field, value) in [
            ("poll_interval", self.poll_interval),
            ("request_timeout", self.request_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidSetting {
                    field,
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.max_duration.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidSetting {
                field: "max_duration",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.threshold_check_interval.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::InvalidSetting {
                field: "threshold_check_interval",
                message: "must be greater than zero".to_string(),
            });
        }
        if let Some(path) = &self.health_path {
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidSetting {
                    field: "health_path",
                    message: format!("`{}` must start with `/`", path),
                });
            }
        }
        self.think_time.validate()?;

        if self.scenarios.is_empty() {
            return Err(ConfigError::NoScenarios);
        }
        let mut scenarios = Vec::with_capacity(self.scenarios.len());
        for (name, spec) in &self.scenarios {
            let scenario = spec.to_scenario(name);
            scenario.validate()?;
            scenarios.push(scenario);
        }
        scenarios.sort_by(|a, b| {
            a.start_offset
                .cmp(&b.start_offset)
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(TestPlan {
            service_url: self.service_url.clone(),
            environment: self.environment.clone(),
            baseline_rps: self.baseline_rps,
            health_path: self.health_path.clone(),
            request_timeout: self.request_timeout,
            max_duration: self.max_duration,
            pool: PoolConfig {
                poll_interval: self.poll_interval,
                think_time: self.think_time,
                grace_period: self.grace_period,
                seed: self.seed,
            },
            scenarios,
            catalog: WorkloadCatalog::new(self.workload.clone(), self.selection)?,
            thresholds: Threshold::from_specs(&self.thresholds)?,
            threshold_check_interval: self.threshold_check_interval,
            missing_metric: self.missing_metric,
            rules: self.rules.resolve()?,
        })
    }
}

/// Parse a profile file into a document, format chosen by extension
fn read_document(path: &Path) -> Result<Value, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let parse_error = |message: String| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    };

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match extension.as_str() {
        "toml" => toml::from_str(&content).map_err(|e| parse_error(e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(|e| parse_error(e.to_string())),
        "json" => serde_json::from_str(&content).map_err(|e| parse_error(e.to_string())),
        _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Deep-merge environment overrides into the file document
fn merge_overrides(target: &mut Value, overrides: Value) {
    let (Value::Object(target), Value::Object(overrides)) = (target, overrides) else {
        return;
    };

    for (key, value) in overrides {
        let normalized = normalize_key(&key);
        let existing = target
            .keys()
            .find(|k| normalize_key(k) == normalized)
            .cloned();

        match existing {
            Some(existing) if value.is_object() && target[&existing].is_object() => {
                if let Some(slot) = target.get_mut(&existing) {
                    merge_overrides(slot, value);
                }
            }
            Some(existing) => {
                target.insert(existing, value);
            }
            None => {
                target.insert(key, value);
            }
        }
    }
}

/// Validated, ready-to-run configuration
#[derive(Debug, Clone)]
pub struct TestPlan {
    pub service_url: String,
    pub environment: String,
    pub baseline_rps: f64,
    pub health_path: Option<String>,
    pub request_timeout: Duration,
    pub max_duration: Option<Duration>,
    pub pool: PoolConfig,
    /// Ordered by start offset, then name
    pub scenarios: Vec<Scenario>,
    pub catalog: WorkloadCatalog,
    pub thresholds: Vec<Threshold>,
    pub threshold_check_interval: Option<Duration>,
    pub missing_metric: MissingMetricPolicy,
    pub rules: RuleTable,
}

impl TestPlan {
    /// When the last scenario is planned to end, ignoring the budget
    pub fn planned_duration(&self) -> Duration {
        self.scenarios
            .iter()
            .map(|s| s.end_offset())
            .max()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExecutorKind;
    use crate::recommendation::ScalingAction;
    use std::io::Write;

    const LENDINGS_TOML: &str = r#"
service_url = "http://localhost:8091"
environment = "staging"
seed = 42
health_path = "/actuator/health"
selection = "all"
rules = "lendings"

[think_time]
min = "1s"
max = "3s"

[[workload]]
name = "GET lendings"
path = "/api/lendings?page=0&size=10"
expected_status = [{ from = 200, to = 299 }]
max_latency = "1000ms"

[[workload]]
name = "GET lending by ID"
path = "/api/lendings/1"
expected_status = [{ from = 200, to = 299 }, 404]

[scenarios.smoke_test]
executor = "constant-vus"
vus = 5
duration = "30s"
tags = { test_type = "smoke" }

[scenarios.load_test]
executor = "ramping-vus"
start_vus = 0
start_time = "30s"
stages = [
  { duration = "1m", target = 20 },
  { duration = "2m", target = 20 },
  { duration = "1m", target = 50 },
  { duration = "2m", target = 50 },
  { duration = "1m", target = 0 },
]

[scenarios.spike_test]
executor = "ramping-vus"
start_time = "10m"
stages = [
  { duration = "10s", target = 150 },
  { duration = "30s", target = 150 },
  { duration = "10s", target = 0 },
]

[thresholds]
http_req_duration = ["p(95)<2000", "p(99)<5000"]
http_req_failed = [{ threshold = "rate<0.1", abort_on_fail = true }]
http_reqs = ["rate>10"]
"#;

    fn write_profile(extension: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(extension)
            .tempfile()
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_toml_profile() {
        let file = write_profile(".toml", LENDINGS_TOML);
        let profile = TestProfile::load_with_prefix(file.path(), "PROBE_TEST_TOML").unwrap();

        assert_eq!(profile.service_url, "http://localhost:8091");
        assert_eq!(profile.baseline_rps, 50.0);
        assert_eq!(profile.selection, Selection::All);
        assert_eq!(profile.think_time.max, Duration::from_secs(3));

        let plan = profile.plan().unwrap();
        assert_eq!(plan.rules.name(), "lendings");
        assert_eq!(plan.thresholds.len(), 4);
        assert_eq!(plan.pool.seed, Some(42));
        assert_eq!(plan.planned_duration(), Duration::from_secs(650));

        let names: Vec<&str> = plan.scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["smoke_test", "load_test", "spike_test"]);
        assert_eq!(plan.scenarios[0].executor, ExecutorKind::ConstantConcurrency);
        assert_eq!(plan.scenarios[0].tags["test_type"], "smoke");
        assert_eq!(plan.scenarios[1].start_offset, Duration::from_secs(30));
        assert!(plan
            .thresholds
            .iter()
            .any(|t| t.metric == "http_req_failed" && t.abort_on_fail));
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_profile(".toml", LENDINGS_TOML);
        std::env::set_var("PROBE_TEST_ENV__SERVICE_URL", "http://lendings.staging:8091");
        std::env::set_var("PROBE_TEST_ENV__BASELINE_RPS", "75");
        std::env::set_var("PROBE_TEST_ENV__ENVIRONMENT", "production");

        let profile = TestProfile::load_with_prefix(file.path(), "PROBE_TEST_ENV").unwrap();

        assert_eq!(profile.service_url, "http://lendings.staging:8091");
        assert_eq!(profile.baseline_rps, 75.0);
        assert_eq!(profile.environment, "production");
    }

    const BOOKS_JSON: &str = r#"{
        "serviceUrl": "http://localhost:8082",
        "thinkTime": {"min": "500ms", "max": "1s"},
        "workload": [{
            "name": "List Books",
            "path": "/api/books",
            "expectedStatus": [200],
            "maxLatency": "800ms",
            "requireBody": true
        }],
        "scenarios": {
            "warmUp": {"executor": "constant-vus", "vus": 2, "duration": "20s"},
            "loadTest": {
                "executor": "ramping-vus",
                "startVUs": 2,
                "startTime": "10s",
                "tags": {"testType": "load"},
                "stages": [{"duration": "30s", "target": 10}, {"duration": "30s", "target": 0}]
            }
        },
        "thresholds": {
            "http_req_failed": [{"threshold": "rate<0.1", "abortOnFail": true}]
        },
        "rules": "books"
    }"#;

    #[test]
    fn test_load_json_file_with_k6_spellings() {
        let file = write_profile(".json", BOOKS_JSON);
        let plan = TestProfile::load(file.path()).unwrap().plan().unwrap();

        assert_eq!(plan.service_url, "http://localhost:8082");
        assert_eq!(plan.pool.think_time.min, Duration::from_millis(500));

        let names: Vec<&str> = plan.scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["warmUp", "loadTest"]);
        let load = &plan.scenarios[1];
        assert_eq!(load.start_target, 2);
        assert_eq!(load.start_offset, Duration::from_secs(10));
        assert_eq!(load.tags["testType"], "load");
        assert_eq!(plan.planned_duration(), Duration::from_secs(70));

        assert!(plan.thresholds[0].abort_on_fail);

        let operation = &plan.catalog.operations()[0];
        assert!(operation.status_ok(200));
        assert!(!operation.status_ok(201));
        assert_eq!(operation.max_latency, Some(Duration::from_millis(800)));
        assert!(operation.require_body);
    }

    #[test]
    fn test_load_yaml_file_with_k6_spellings() {
        let file = write_profile(
            ".yaml",
            r#"
serviceUrl: http://localhost:8091
workload:
  - name: GET lendings
    path: /api/lendings
scenarios:
  spikeTest:
    executor: ramping-vus
    startTime: 1m
    stages:
      - duration: 10s
        target: 150
      - duration: 10s
        target: 0
thresholds:
  http_req_duration:
    - threshold: p(95)<2000
      abortOnFail: true
"#,
        );
        let plan = TestProfile::load_with_prefix(file.path(), "PROBE_TEST_YAML")
            .unwrap()
            .plan()
            .unwrap();

        assert_eq!(plan.scenarios[0].name, "spikeTest");
        assert_eq!(plan.scenarios[0].start_offset, Duration::from_secs(60));
        assert!(plan.thresholds[0].abort_on_fail);
    }

    #[test]
    fn test_environment_overrides_camel_case_keys() {
        let file = write_profile(".json", BOOKS_JSON);
        std::env::set_var("PROBE_TEST_CAMEL__SERVICE_URL", "http://books.staging:8082");
        std::env::set_var("PROBE_TEST_CAMEL__SCENARIOS__LOAD_TEST__START_TIME", "25s");

        let plan = TestProfile::load_with_prefix(file.path(), "PROBE_TEST_CAMEL")
            .unwrap()
            .plan()
            .unwrap();

        assert_eq!(plan.service_url, "http://books.staging:8082");
        let load = plan.scenarios.iter().find(|s| s.name == "loadTest").unwrap();
        assert_eq!(load.start_offset, Duration::from_secs(25));
        assert_eq!(load.start_target, 2);
    }

    #[test]
    fn test_merge_overrides_matches_keys_loosely() {
        let mut document = serde_json::json!({
            "serviceUrl": "http://a",
            "thinkTime": {"min": "1s", "max": "2s"},
            "scenarios": {"loadTest": {"startVUs": 1}}
        });
        let overrides = serde_json::json!({
            "service_url": "http://b",
            "think_time": {"max": "5s"},
            "scenarios": {"loadtest": {"start_vus": 4}},
            "seed": 9
        });

        merge_overrides(&mut document, overrides);

        assert_eq!(
            document,
            serde_json::json!({
                "serviceUrl": "http://b",
                "thinkTime": {"min": "1s", "max": "5s"},
                "scenarios": {"loadTest": {"startVUs": 4}},
                "seed": 9
            })
        );
    }

    #[test]
    fn test_unsupported_extension() {
        let file = write_profile(".ini", "service_url = x");
        let result = TestProfile::load_with_prefix(file.path(), "PROBE_TEST_INI");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_load_json_profile_with_k6_spellings() {
        let raw = r#"{
            "serviceUrl": "http://localhost:8082",
            "workload": [{"name": "List Books", "path": "/api/books"}],
            "scenarios": {
                "load_test": {
                    "executor": "ramping-vus",
                    "startVUs": 2,
                    "startTime": "10s",
                    "stages": [{"duration": "30s", "target": 10}, {"duration": "30s", "target": 0}]
                }
            },
            "rules": [{"name": "fallback", "when": "always", "action": "maintain", "replicas": 1}]
        }"#;
        let profile: TestProfile = serde_json::from_str(raw).unwrap();
        let plan = profile.plan().unwrap();

        assert_eq!(plan.scenarios[0].start_target, 2);
        assert_eq!(plan.scenarios[0].start_offset, Duration::from_secs(10));
        assert_eq!(plan.environment, "staging");
        assert_eq!(plan.rules.name(), "custom");
        assert_eq!(plan.rules.rules()[0].action, ScalingAction::Maintain);
        assert_eq!(plan.missing_metric, MissingMetricPolicy::Fail);
    }

    #[test]
    fn test_plan_rejects_bad_settings() {
        let file = write_profile(".toml", LENDINGS_TOML);
        let base = TestProfile::load_with_prefix(file.path(), "PROBE_TEST_BAD").unwrap();

        let mut profile = base.clone();
        profile.service_url = "not a url".to_string();
        assert!(matches!(
            profile.plan(),
            Err(ConfigError::InvalidSetting { field: "service_url", .. })
        ));

        let mut profile = base.clone();
        profile.rules = RulesSpec::Builtin("unknown".to_string());
        assert!(matches!(profile.plan(), Err(ConfigError::UnknownRuleProfile(_))));

        let mut profile = base.clone();
        profile.scenarios.clear();
        assert!(matches!(profile.plan(), Err(ConfigError::NoScenarios)));

        let mut profile = base.clone();
        profile.think_time = ThinkTime {
            min: Duration::from_secs(5),
            max: Duration::from_secs(1),
        };
        assert!(matches!(profile.plan(), Err(ConfigError::InvalidThinkTime { .. })));

        let mut profile = base.clone();
        profile.thresholds.insert(
            "http_req_duration".to_string(),
            vec![ThresholdSpec::Expression("p(95) lt 2000".to_string())],
        );
        assert!(matches!(profile.plan(), Err(ConfigError::InvalidThreshold { .. })));

        let mut profile = base;
        profile.scenarios.insert(
            "broken".to_string(),
            ScenarioSpec::Ramping {
                start_vus: 0,
                stages: vec![],
                start_time: Duration::ZERO,
                tags: Tags::new(),
            },
        );
        assert!(matches!(profile.plan(), Err(ConfigError::EmptyStages { .. })));
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let result = TestProfile::load_with_prefix("/nonexistent/profile.toml", "PROBE_TEST_MISSING");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}

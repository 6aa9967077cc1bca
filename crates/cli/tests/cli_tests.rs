//! CLI integration tests

use probe_lib::{
    metrics::MetricsSnapshot, scheduler::ScheduleOutcome, RunReport, RunSignals, TestProfile,
};
use std::io::Write;
use std::process::{Command, Output};
use std::time::Duration;
use tempfile::NamedTempFile;

const PROFILE: &str = r#"
service_url = "http://localhost:8082"
environment = "staging"
baseline_rps = 20
rules = "books"

[[workload]]
name = "List Books"
path = "/api/books"

[scenarios.warmup]
executor = "constant-vus"
vus = 5
duration = "30s"

[scenarios.spike]
executor = "ramping-vus"
start_time = "20s"
stages = [
  { duration = "10s", target = 100 },
  { duration = "10s", target = 0 },
]

[thresholds]
http_req_duration = ["p(95)<2000"]
http_req_failed = ["rate<0.1"]
"#;

fn cprobe(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cprobe"))
        .args(args)
        .output()
        .expect("Failed to execute cprobe")
}

fn write_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

/// A saved report whose signals point at a slow, error-prone service
fn saved_report() -> NamedTempFile {
    let profile_file = write_file(".toml", PROFILE);
    let plan = TestProfile::load(profile_file.path()).unwrap().plan().unwrap();

    let signals = RunSignals {
        p95_latency_ms: 2500.0,
        p99_latency_ms: 4000.0,
        avg_latency_ms: 800.0,
        error_rate: 0.02,
        success_rate: 0.98,
        peak_concurrency: 105.0,
        throughput_rps: 30.0,
        baseline_rps: 20.0,
    };
    let recommendation = plan.rules.recommend(&signals);
    let schedule = ScheduleOutcome {
        scenarios: vec![],
        elapsed: Duration::from_secs(50),
        deadline_exceeded: false,
        cancelled: false,
    };
    let report = RunReport::build(
        &plan,
        &MetricsSnapshot::default(),
        &schedule,
        vec![],
        signals,
        recommendation,
    );

    write_file(".json", &serde_json::to_string_pretty(&report).unwrap())
}

#[test]
fn test_cli_help() {
    let output = cprobe(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    for command in ["validate", "plan", "report", "recommend", "rules", "status"] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

#[test]
fn test_cli_version() {
    let output = cprobe(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("cprobe"), "Should show binary name");
}

#[test]
fn test_validate_accepts_profile() {
    let profile = write_file(".toml", PROFILE);
    let output = cprobe(&[
        "validate",
        profile.path().to_str().unwrap(),
        "--format",
        "json",
    ]);

    assert!(output.status.success());
    let summary = stdout_json(&output);
    assert_eq!(summary["valid"], true);
    assert_eq!(summary["thresholds"], 2);
    assert_eq!(summary["rules"], "books");
    assert_eq!(summary["plannedDurationSecs"], 40);
}

#[test]
fn test_validate_rejects_bad_threshold() {
    let broken = PROFILE.replace("rate<0.1", "rate<<0.1");
    let profile = write_file(".toml", &broken);
    let output = cprobe(&["validate", profile.path().to_str().unwrap()]);

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("http_req_failed"), "stderr: {}", stderr);
}

#[test]
fn test_validate_missing_file() {
    let output = cprobe(&["validate", "/nonexistent/profile.toml"]);
    assert!(!output.status.success());
}

#[test]
fn test_plan_adds_overlapping_scenarios() {
    let profile = write_file(".toml", PROFILE);
    let output = cprobe(&[
        "plan",
        profile.path().to_str().unwrap(),
        "--step",
        "5s",
        "--format",
        "json",
    ]);

    assert!(output.status.success());
    let points = stdout_json(&output);
    let points = points.as_array().unwrap();
    assert_eq!(points.len(), 9);

    let at = |secs: u64| {
        points
            .iter()
            .find(|p| p["offsetSecs"] == secs)
            .map(|p| p["total"].as_u64().unwrap())
            .unwrap()
    };
    assert_eq!(at(0), 5);
    assert_eq!(at(25), 55);
    assert_eq!(at(30), 100);
    assert_eq!(at(40), 0);
}

#[test]
fn test_rules_lists_builtin_profiles() {
    let output = cprobe(&["rules", "--format", "json"]);
    assert!(output.status.success());

    let profiles = stdout_json(&output);
    let names: Vec<&str> = profiles
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["default", "lendings", "books", "quick"]);
    assert_eq!(profiles[0]["rules"].as_array().unwrap().len(), 8);
}

#[test]
fn test_report_renders_saved_report() {
    let report = saved_report();

    let json = cprobe(&["report", report.path().to_str().unwrap(), "--format", "json"]);
    assert!(json.status.success());
    assert_eq!(stdout_json(&json)["environment"], "staging");

    let table = cprobe(&["report", report.path().to_str().unwrap()]);
    assert!(table.status.success());
    let stdout = String::from_utf8_lossy(&table.stdout);
    assert!(stdout.contains("Load Test Report"));
    assert!(stdout.contains("high_avg_latency"));
}

#[test]
fn test_recommend_with_other_rules() {
    let report = saved_report();
    let output = cprobe(&[
        "recommend",
        report.path().to_str().unwrap(),
        "--rules",
        "lendings",
        "--format",
        "json",
    ]);

    assert!(output.status.success());
    let rerun = stdout_json(&output);
    assert_eq!(rerun["saved"]["rule"], "high_avg_latency");
    assert_eq!(rerun["recommendation"]["rule"], "elevated_latency_or_errors");
    assert_eq!(rerun["recommendation"]["action"], "SCALE_UP");
    assert_eq!(rerun["recommendation"]["replicas"], 3);
    assert_eq!(rerun["changed"], true);
}

#[test]
fn test_recommend_unknown_rules() {
    let report = saved_report();
    let output = cprobe(&[
        "recommend",
        report.path().to_str().unwrap(),
        "--rules",
        "catalog",
    ]);
    assert!(!output.status.success());
}

#[test]
fn test_status_reads_live_progress() {
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/progress")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "phase": "running",
                "active_workers": 12,
                "scenarios": {
                    "warmup": {"phase": "running", "active_workers": 12, "iterations": 340, "updated_at": 1760800000}
                }
            }"#,
        )
        .create();

    let output = cprobe(&["status", "--api-url", &server.url(), "--format", "json"]);

    assert!(output.status.success());
    let progress = stdout_json(&output);
    assert_eq!(progress["phase"], "running");
    assert_eq!(progress["scenarios"]["warmup"]["iterations"], 340);
}

#[test]
fn test_status_unreachable_runner() {
    let output = cprobe(&["status", "--api-url", "http://127.0.0.1:9"]);
    assert!(!output.status.success());
}

//! Integration tests for the runner API endpoints

#[path = "../src/api.rs"]
#[allow(dead_code)]
mod api;

use api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use probe_lib::{
    observability::RunnerMetrics,
    progress::{ProgressRegistry, ScenarioPhase},
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let progress = ProgressRegistry::new();
    progress.register("warmup").await;
    progress.register("load_test").await;

    let state = Arc::new(AppState::new(progress, RunnerMetrics::new()));
    let router = create_router(state.clone());

    (router, state)
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    assert!(health["uptime_secs"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn test_progress_is_pending_before_start() {
    let (app, _state) = setup_test_app().await;

    let (status, progress) = get_json(app, "/progress").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(progress["phase"], "pending");
    assert_eq!(progress["active_workers"], 0);
    assert!(progress["scenarios"]["warmup"].is_object());
    assert!(progress["scenarios"]["load_test"].is_object());
}

#[tokio::test]
async fn test_progress_reports_running_workers() {
    let (app, state) = setup_test_app().await;

    state
        .progress
        .set_phase("warmup", ScenarioPhase::Running)
        .await;
    state.progress.set_workers("warmup", 5, 120).await;

    let (_, progress) = get_json(app, "/progress").await;

    assert_eq!(progress["phase"], "running");
    assert_eq!(progress["active_workers"], 5);
    assert_eq!(progress["scenarios"]["warmup"]["iterations"], 120);
    assert_eq!(progress["scenarios"]["load_test"]["phase"], "pending");
}

#[tokio::test]
async fn test_progress_after_cancellation() {
    let (app, state) = setup_test_app().await;

    state
        .progress
        .set_phase("warmup", ScenarioPhase::Completed)
        .await;
    state
        .progress
        .set_phase("load_test", ScenarioPhase::Cancelled)
        .await;

    let (_, progress) = get_json(app, "/progress").await;
    assert_eq!(progress["phase"], "cancelled");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.set_active_workers("warmup", 10);
    state.metrics.inc_iterations("warmup");
    state
        .metrics
        .observe_request(Duration::from_millis(250), true);
    state.metrics.add_discarded_iterations(1);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("capacity_probe_active_workers"));
    assert!(metrics_text.contains("capacity_probe_iterations_total"));
    assert!(metrics_text.contains("capacity_probe_request_failures_total"));
    assert!(metrics_text.contains("capacity_probe_iterations_discarded_total"));
    assert!(metrics_text.contains("capacity_probe_request_duration_seconds_bucket"));
}

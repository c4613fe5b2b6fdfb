//! Integration tests for the agent API endpoints

#[path = "../src/api.rs"]
mod api;

use api::{create_router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use opsbot_lib::{
    health::{components, HealthRegistry},
    models::{AnomalyReport, NotificationResult},
    observability::AgentMetrics,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::with_pipeline_components().await;
    let state = Arc::new(AppState::new(health_registry));
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

async fn get_text(app: Router, uri: &str) -> (StatusCode, String, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get("content-type")
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::LOG_BACKEND, "Log backend unreachable after 3 attempts")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["log_backend"]["message"],
        "Log backend unreachable after 3 attempts"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_history_unwritable() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::HISTORY, "Failed to write notification history")
        .await;

    let (status, health) = get_json(app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_healthz_reports_last_cycle() {
    let (app, state) = setup_test_app().await;
    state.health_registry.record_cycle(1_700_000_030).await;

    let (_, health) = get_json(app, "/healthz").await;

    assert_eq!(health["last_cycle_timestamp"], 1_700_000_030);
}

#[tokio::test]
async fn test_healthz_includes_component_details() {
    let (app, _state) = setup_test_app().await;

    let (_, health) = get_json(app, "/healthz").await;

    for name in components::ALL {
        assert!(health["components"][name].is_object(), "missing {name}");
    }
}

#[tokio::test]
async fn test_readyz_returns_503_before_loop_starts() {
    let (app, _state) = setup_test_app().await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
    assert_eq!(readiness["reason"], "Agent loop not started");
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app().await;
    state.health_registry.set_ready(true).await;

    let (status, readiness) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::HISTORY, "disk full")
        .await;

    let (status, _) = get_json(app, "/readyz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, _state) = setup_test_app().await;

    let metrics = AgentMetrics::new();
    metrics.observe_cycle_duration(12.5);
    metrics.record_sample(&AnomalyReport::classify(92.0, 40.0, 1_700_000_000, 80.0));
    metrics.inc_remediation("restarted");
    metrics.inc_notification(&NotificationResult::sent("ok"));
    metrics.inc_backend_retries("log_errors");

    let (status, content_type, text) = get_text(app, "/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.contains("text/plain"));
    assert!(text.contains("opsbot_cycles_total"));
    assert!(text.contains("opsbot_anomalies_detected_total"));
    assert!(text.contains("opsbot_remediations_total{outcome=\"restarted\"}"));
    assert!(text.contains("opsbot_notifications_total{status=\"sent\"}"));
    assert!(text.contains("opsbot_backend_retries_total{query=\"log_errors\"}"));
    assert!(text.contains("opsbot_last_cpu_usage_percent"));
}

#[tokio::test]
async fn test_metrics_contains_histogram_buckets() {
    let (app, _state) = setup_test_app().await;

    let metrics = AgentMetrics::new();
    metrics.observe_cycle_duration(0.8);
    metrics.observe_cycle_duration(10.2);

    let (_, _, text) = get_text(app, "/metrics").await;

    assert!(text.contains("opsbot_cycle_duration_seconds_bucket"));
    assert!(text.contains("opsbot_cycle_duration_seconds_count"));
    assert!(text.contains("opsbot_cycle_duration_seconds_sum"));
}

//! Router-level tests for the HTTP API, backed by a temporary SQLite database.

use apiwatch::api::{self, state::AppState};
use apiwatch::config::AppConfig;
use apiwatch::detect::{AnomalyDetector, ThresholdPolicy};
use apiwatch::metrics::{MetricSource, Sample, SourceError, Window};
use apiwatch::notify::LogNotifier;
use apiwatch::storage::{self, Pool, SqliteAnomalyStore};
use async_trait::async_trait;
use std::sync::Arc;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

fn setup() -> (TempDir, Pool, Router) {
    let dir = tempfile::tempdir().unwrap();
    let pool = storage::open_pool(dir.path().join("apiwatch.db")).unwrap();

    let mut config = AppConfig::default();
    config.notify.log = false;
    let detector = apiwatch::build_detector(&config, pool.clone()).unwrap();
    let state = AppState::new(pool.clone(), detector, config.schedule.manual_window());

    (dir, pool, api::router(state))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1_000_000)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn register(app: &Router, name: &str) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/apis",
        Some(json!({ "name": name, "url": format!("http://{}.test", name) })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

async fn ingest(app: &Router, api_id: i64, error_rate: Option<f64>, response_time_ms: Option<f64>) {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/metrics",
        Some(json!({
            "apiId": api_id,
            "errorRate": error_rate,
            "responseTimeMs": response_time_ms,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn detect(app: &Router) -> Value {
    let (status, body) = send(app, Method::POST, "/api/anomalies/detect", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "SUCCESS");
    body
}

#[tokio::test]
async fn test_health() {
    let (_dir, _pool, app) = setup();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_detect_with_no_metrics() {
    let (_dir, _pool, app) = setup();
    let body = detect(&app).await;
    assert_eq!(body["anomaliesFound"], 0);
    assert!(body["scanWindowStart"].is_string());
    assert!(body["scanWindowEnd"].is_string());

    let (_, list) = send(&app, Method::GET, "/api/anomalies", None).await;
    assert_eq!(list.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_detect_healthy_metric() {
    let (_dir, _pool, app) = setup();
    let api_id = register(&app, "healthy").await;
    ingest(&app, api_id, Some(0.01), Some(200.0)).await;

    assert_eq!(detect(&app).await["anomaliesFound"], 0);
}

#[tokio::test]
async fn test_detect_slow_response() {
    let (_dir, _pool, app) = setup();
    let api_id = register(&app, "slow").await;
    ingest(&app, api_id, Some(0.01), Some(5000.0)).await;

    assert_eq!(detect(&app).await["anomaliesFound"], 1);

    let (_, list) = send(&app, Method::GET, "/api/anomalies", None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["type"], "Slow Response Time");
    assert_eq!(list[0]["severity"], "WARNING");
    assert_eq!(list[0]["apiId"], api_id);
}

#[tokio::test]
async fn test_detect_high_error_rate() {
    let (_dir, _pool, app) = setup();
    let api_id = register(&app, "errors").await;
    ingest(&app, api_id, Some(0.5), Some(200.0)).await;

    assert_eq!(detect(&app).await["anomaliesFound"], 1);

    let (_, list) = send(&app, Method::GET, "/api/anomalies", None).await;
    assert_eq!(list[0]["type"], "High Error Rate");
    assert_eq!(list[0]["severity"], "CRITICAL");
}

#[tokio::test]
async fn test_detect_both_thresholds_exceeded() {
    let (_dir, _pool, app) = setup();
    let api_id = register(&app, "failing").await;
    ingest(&app, api_id, Some(0.5), Some(1500.0)).await;

    assert_eq!(detect(&app).await["anomaliesFound"], 1);

    let (_, list) = send(&app, Method::GET, "/api/anomalies", None).await;
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["type"], "High Error Rate; Slow Response Time");
    assert_eq!(list[0]["severity"], "CRITICAL");
}

#[tokio::test]
async fn test_detect_does_not_duplicate() {
    let (_dir, _pool, app) = setup();
    let api_id = register(&app, "dup").await;
    ingest(&app, api_id, None, Some(5000.0)).await;

    assert_eq!(detect(&app).await["anomaliesFound"], 1);
    assert_eq!(detect(&app).await["anomaliesFound"], 0);

    let (_, list) = send(&app, Method::GET, "/api/anomalies", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_concurrent_triggers_create_one_anomaly() {
    let (_dir, _pool, app) = setup();
    let api_id = register(&app, "race").await;
    ingest(&app, api_id, Some(0.9), None).await;

    let runs = (0..4).map(|_| {
        let app = app.clone();
        tokio::spawn(async move { detect(&app).await["anomaliesFound"].as_i64().unwrap() })
    });
    let mut total = 0;
    for run in runs.collect::<Vec<_>>() {
        total += run.await.unwrap();
    }

    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_get_anomaly_by_id() {
    let (_dir, _pool, app) = setup();
    let api_id = register(&app, "lookup").await;
    ingest(&app, api_id, Some(0.3), None).await;
    detect(&app).await;

    let (_, list) = send(&app, Method::GET, "/api/anomalies?limit=1", None).await;
    let id = list[0]["id"].as_i64().unwrap();

    let (status, body) = send(&app, Method::GET, &format!("/api/anomalies/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);

    let (status, _) = send(&app, Method::GET, "/api/anomalies/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_register_duplicate_api_conflicts() {
    let (_dir, _pool, app) = setup();
    register(&app, "billing").await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/apis",
        Some(json!({ "name": "billing", "url": "http://other" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("billing"));

    let (_, list) = send(&app, Method::GET, "/api/apis", None).await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_ingest_validation() {
    let (_dir, _pool, app) = setup();

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/metrics",
        Some(json!({ "apiId": 42, "errorRate": 0.2 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let api_id = register(&app, "billing").await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/metrics",
        Some(json!({ "apiId": api_id, "errorRate": 4.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_sample_outside_manual_window_is_ignored() {
    let (_dir, _pool, app) = setup();
    let api_id = register(&app, "stale").await;
    let stale = chrono::Utc::now() - chrono::Duration::minutes(30);
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/metrics",
        Some(json!({ "apiId": api_id, "timestamp": stale, "errorRate": 0.9 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(detect(&app).await["anomaliesFound"], 0);
}

#[tokio::test]
async fn test_unknown_route() {
    let (_dir, _pool, app) = setup();
    let request = Request::builder().uri("/nope").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

struct UnavailableSource;

#[async_trait]
impl MetricSource for UnavailableSource {
    async fn fetch(&self, _window: Window) -> Result<Vec<Sample>, SourceError> {
        Err(SourceError::Unavailable("metrics backend offline".to_string()))
    }
}

#[tokio::test]
async fn test_detect_reports_failure_when_metrics_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let pool = storage::open_pool(dir.path().join("apiwatch.db")).unwrap();
    let detector = AnomalyDetector::new(
        Arc::new(UnavailableSource),
        Arc::new(SqliteAnomalyStore::new(pool.clone())),
        Arc::new(LogNotifier),
        ThresholdPolicy::default(),
    );
    let window = AppConfig::default().schedule.manual_window();
    let app = api::router(AppState::new(pool, detector, window));

    let (status, body) = send(&app, Method::POST, "/api/anomalies/detect", None).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "FAILURE");
    assert!(body["error"].as_str().unwrap().contains("metrics backend offline"));
    assert!(body.get("anomaliesFound").is_none());
}

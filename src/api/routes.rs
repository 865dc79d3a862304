//! API route definitions.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use super::{state::AppState, ApiError};
use crate::detect::Anomaly;
use crate::metrics::Sample;
use crate::scheduler::{trigger_manual_detection, ScanReport};
use crate::storage::{apis, samples, MonitoredApi, NewSample};

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/anomalies", get(list_anomalies))
        .route("/anomalies/detect", post(trigger_detection))
        .route("/anomalies/{id}", get(get_anomaly))
        .route("/apis", get(list_apis).post(register_api))
        .route("/metrics", post(ingest_sample))
}

async fn trigger_detection(State(state): State<AppState>) -> Result<Json<ScanReport>, ApiError> {
    let report = trigger_manual_detection(&state.detector, state.manual_window).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

async fn list_anomalies(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Anomaly>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    Ok(Json(state.anomalies.list_recent(limit).await?))
}

async fn get_anomaly(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Anomaly>, ApiError> {
    state
        .anomalies
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("anomaly {} not found", id)))
}

async fn list_apis(State(state): State<AppState>) -> Result<Json<Vec<MonitoredApi>>, ApiError> {
    Ok(Json(apis::list(&state.pool).await?))
}

#[derive(Debug, Deserialize)]
struct RegisterApi {
    name: String,
    url: String,
}

async fn register_api(
    State(state): State<AppState>,
    Json(body): Json<RegisterApi>,
) -> Result<(StatusCode, Json<MonitoredApi>), ApiError> {
    let api = apis::register(&state.pool, &body.name, &body.url).await?;
    tracing::info!(api_id = api.id, name = %api.name, "Registered API");
    Ok((StatusCode::CREATED, Json(api)))
}

async fn ingest_sample(
    State(state): State<AppState>,
    Json(body): Json<NewSample>,
) -> Result<(StatusCode, Json<Sample>), ApiError> {
    let sample = samples::record(&state.pool, body).await?;
    Ok((StatusCode::CREATED, Json(sample)))
}

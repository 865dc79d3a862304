//! API layer -- axum routes, handlers, and error mapping.

mod routes;
pub mod state;

use self::state::AppState;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::detect::DetectError;
use crate::storage::StorageError;

/// Build the application router with all API routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", routes::api_routes())
        .fallback(fallback)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not found")
}

/// Errors surfaced by handlers, rendered as JSON bodies.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Detection(DetectError),
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnknownApi(_) => ApiError::NotFound(err.to_string()),
            StorageError::DuplicateApi(_) => ApiError::Conflict(err.to_string()),
            StorageError::Invalid(msg) => ApiError::Unprocessable(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        ApiError::Detection(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, Json(json!({ "error": msg }))),
            ApiError::Unprocessable(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": msg })))
            }
            ApiError::Detection(err) => {
                tracing::error!(error = %err, "Manual detection failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "status": "FAILURE", "error": err.to_string() })),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": msg })))
            }
        }
        .into_response()
    }
}

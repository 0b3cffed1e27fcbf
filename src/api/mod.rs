//! HTTP surface.
//!
//! - `/api/queue` - upload files and inspect the queue
//! - `/api/pipeline/*` - start, pause, resume, reset and the SSE event stream
//! - `/api/receipts` - search, fetch, delete and export stored receipts

pub mod queue;
pub mod receipts;
pub mod sse;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::Serialize;

use crate::AppState;

/// Error body returned by every handler.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub(crate) fn api_error(
    status: StatusCode,
    code: &str,
    error: impl Into<String>,
) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

/// Map an internal failure to a 500, logging the cause.
pub(crate) fn internal_error(err: &anyhow::Error) -> (StatusCode, Json<ApiError>) {
    tracing::error!(error = %format!("{err:#}"), "Request failed");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        err.to_string(),
    )
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/queue",
            post(queue::upload_handler).get(queue::snapshot_handler),
        )
        .route("/api/pipeline/start", post(queue::start_handler))
        .route("/api/pipeline/pause", post(queue::pause_handler))
        .route("/api/pipeline/resume", post(queue::resume_handler))
        .route("/api/pipeline/reset", post(queue::reset_handler))
        .route("/api/pipeline/events", get(sse::events_handler))
        .route("/api/receipts", get(receipts::search_handler))
        .route("/api/receipts/export", get(receipts::export_handler))
        .route(
            "/api/receipts/{id}",
            get(receipts::get_handler).delete(receipts::delete_handler),
        )
}

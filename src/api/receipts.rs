//! Stored receipt handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;

use super::{ApiResult, api_error, internal_error};
use crate::AppState;
use crate::config::ExportKind;
use crate::domain::{SearchQuery, StoredReceipt};
use crate::export::export_csv;

#[derive(Debug, Deserialize)]
pub struct ExportParams {
    #[serde(default = "default_export_kind")]
    pub kind: ExportKind,
}

fn default_export_kind() -> ExportKind {
    ExportKind::Receipts
}

/// GET /api/receipts?store=&item=
pub async fn search_handler(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Vec<StoredReceipt>>> {
    state
        .store
        .search(&query)
        .await
        .map(Json)
        .map_err(|e| internal_error(&e))
}

/// GET /api/receipts/{id}
pub async fn get_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<StoredReceipt>> {
    match state.store.get(id).await {
        Ok(Some(receipt)) => Ok(Json(receipt)),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Receipt {id} not found"),
        )),
        Err(e) => Err(internal_error(&e)),
    }
}

/// DELETE /api/receipts/{id}
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    match state.store.delete(id).await {
        Ok(true) => {
            tracing::info!(name: "receipt.deleted", id, "Receipt deleted");
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(api_error(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Receipt {id} not found"),
        )),
        Err(e) => Err(internal_error(&e)),
    }
}

/// GET /api/receipts/export?kind=receipts|items
pub async fn export_handler(
    State(state): State<AppState>,
    Query(params): Query<ExportParams>,
) -> ApiResult<impl IntoResponse> {
    let receipts = state.store.list_all().await.map_err(|e| internal_error(&e))?;
    let body = export_csv(params.kind, &receipts).map_err(|e| internal_error(&e))?;

    let filename = match params.kind {
        ExportKind::Receipts => "receipts.csv",
        ExportKind::Items => "receipt_items.csv",
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    ))
}

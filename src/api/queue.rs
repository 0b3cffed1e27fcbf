//! Queue upload and pipeline control handlers.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;

use super::{ApiResult, api_error};
use crate::AppState;
use crate::pipeline::{
    EnqueueReport, PipelineError, PipelineSnapshot, PipelineStatus, RejectedFile, SubmittedFile,
};
use crate::rasterize::{ImageRasterizer, is_pdf};

/// Response for the upload endpoint.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub accepted: Vec<String>,
    pub rejected: Vec<RejectedFile>,
    pub status: PipelineStatus,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: PipelineStatus,
}

/// Whether an upload is a PDF or an image the pipeline can rasterize.
///
/// The declared content type is checked first; the payload is sniffed as a
/// fallback since browsers report generic types for some files.
fn is_supported(content_type: &str, data: &[u8]) -> bool {
    content_type == "application/pdf"
        || content_type.starts_with("image/")
        || is_pdf(data)
        || ImageRasterizer::sniff_mime_type(data).is_some()
}

/// Queue files for processing.
///
/// POST /api/queue
///
/// Accepts multipart form data with PDF or image files. Unsupported files and
/// names already in flight are reported under `rejected`.
pub async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let mut files = Vec::new();
    let mut rejected = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            "MULTIPART_ERROR",
            format!("Failed to read multipart field: {e}"),
        )
    })? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            // plain form fields carry no file
            continue;
        };
        let content_type = field
            .content_type()
            .map_or_else(|| "application/octet-stream".to_string(), str::to_string);

        let data = field.bytes().await.map_err(|e| {
            api_error(
                StatusCode::BAD_REQUEST,
                "READ_ERROR",
                format!("Failed to read file '{filename}': {e}"),
            )
        })?;

        if !is_supported(&content_type, &data) {
            rejected.push(RejectedFile {
                name: filename,
                reason: format!("unsupported type: {content_type}"),
            });
            continue;
        }

        files.push(SubmittedFile::new(filename, data.to_vec()));
    }

    if files.is_empty() && rejected.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "NO_FILES",
            "No files in upload",
        ));
    }

    let EnqueueReport {
        accepted,
        rejected: duplicates,
    } = state.controller.enqueue(files);
    rejected.extend(duplicates);

    tracing::info!(
        accepted = accepted.len(),
        rejected = rejected.len(),
        "Upload processed"
    );

    Ok(Json(UploadResponse {
        accepted,
        rejected,
        status: state.controller.status(),
    }))
}

/// GET /api/queue
pub async fn snapshot_handler(State(state): State<AppState>) -> Json<PipelineSnapshot> {
    Json(state.controller.snapshot())
}

/// POST /api/pipeline/start
pub async fn start_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.controller.start(),
    })
}

/// POST /api/pipeline/pause
pub async fn pause_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.controller.pause(),
    })
}

/// POST /api/pipeline/resume
pub async fn resume_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.controller.resume(),
    })
}

/// POST /api/pipeline/reset
pub async fn reset_handler(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    match state.controller.reset() {
        Ok(()) => Ok(Json(StatusResponse {
            status: state.controller.status(),
        })),
        Err(err @ PipelineError::Busy) => Err(api_error(
            StatusCode::CONFLICT,
            "PIPELINE_BUSY",
            err.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_uploads() {
        assert!(is_supported("application/pdf", b""));
        assert!(is_supported("image/heic", b""));
        assert!(is_supported("application/octet-stream", b"%PDF-1.4"));
        assert!(!is_supported("text/plain", b"hello"));
    }
}

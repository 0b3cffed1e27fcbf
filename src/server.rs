use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tracing::info;

use crate::AppState;
use crate::api;
use crate::config::AppConfig;
use crate::extraction::ExtractionClient;
use crate::pipeline::{PipelineController, PipelineServices, PipelineSettings, PipelineStatus};
use crate::rasterize::DocumentRasterizer;
use crate::store;

/// Wire store, rasterizer, extraction client and pipeline from `config`.
pub async fn build_state(config: Arc<AppConfig>) -> anyhow::Result<AppState> {
    let store = store::connect(&config.storage).await?;
    let extractor = ExtractionClient::from_config(&config.extraction)?;
    let rasterizer = Arc::new(DocumentRasterizer::new(config.rasterizer.clone()));

    let settings = PipelineSettings::from(&config.pipeline);
    info!(
        name: "pipeline.config.loaded",
        concurrent_limit = settings.concurrent_limit,
        batch_size = settings.batch_size,
        max_pages = config.rasterizer.max_pages,
        "Pipeline configuration loaded"
    );

    let controller = PipelineController::new(
        PipelineServices {
            rasterizer,
            extractor,
            store: Arc::clone(&store),
        },
        settings,
    );

    Ok(AppState {
        controller,
        store,
        config,
    })
}

/// Build the full router for `state`.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/healthz", get(health_handler))
        .merge(api::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    let state = build_state(Arc::clone(&config)).await?;
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!(name: "server.stopped", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    pipeline: PipelineStatus,
    store: &'static str,
}

/// GET /healthz
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        pipeline: state.controller.status(),
        store: state.store.provider_name(),
    })
}

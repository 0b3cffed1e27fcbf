//! Receipt Pipeline
//!
//! Batched receipt extraction: uploaded PDFs and images are rasterized,
//! sent in small groups to a vision model, and the structured results are
//! persisted for search and export.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP API with an SSE stream of pipeline events
//! - **Pipeline**: bounded worker pool over an in-memory queue, with
//!   pause/resume/reset and automatic pause on quota exhaustion
//! - **Extraction**: Gemini client with retry, backoff and optional throttling
//! - **Storage**: SQLite (sqlx) or in-memory result store
//!
//! # Modules
//!
//! - [`pipeline`]: queue, workers and the controller
//! - [`extraction`]: remote extraction client
//! - [`rasterize`]: document to page-image conversion
//! - [`store`]: result persistence
//! - [`normalize`]: merchant name normalization
//! - [`export`]: CSV export

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::implicit_hasher)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod api;
pub mod config;
pub mod domain;
pub mod export;
pub mod extraction;
pub mod normalize;
pub mod pipeline;
pub mod rasterize;
pub mod server;
pub mod store;

use crate::config::AppConfig;

use pipeline::PipelineController;
use std::sync::Arc;
use store::ResultStore;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Queue, worker pool and pipeline status.
    pub controller: PipelineController,
    /// Persisted receipts.
    pub store: Arc<dyn ResultStore>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

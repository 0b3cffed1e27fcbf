//! Batched, bounded-concurrency processing of uploaded receipts.
//!
//! Submitted files land in a shared pending queue. A fixed pool of workers
//! repeatedly claims a sub-batch from the front of the queue, rasterizes every
//! claimed document, sends the first page of each as one extraction request and
//! persists every successful result. Each item moves
//! `queued -> processing -> success | error` exactly once.
//!
//! # Architecture
//!
//! - [`PipelineController`]: operator surface (enqueue, start, pause, resume, reset)
//! - [`PipelineState`]: queue, history and pipeline status behind one mutex
//! - [`StatusEvent`]: broadcast on every item and pipeline transition
//!
//! Only the first rendered page of a document is sent for extraction.
//! Receipts are single-page documents in practice and the extraction
//! request pairs one image with one result.

mod controller;
mod events;
mod state;
mod worker;

pub use controller::{PipelineController, PipelineServices, PipelineSettings};
pub use events::{ItemUpdate, StatusEvent};
pub use state::{EnqueueReport, PipelineState, RejectedFile};

use serde::Serialize;

use crate::domain::ExtractedReceipt;

/// Lifecycle of one submitted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Queued,
    Processing,
    Success,
    Error,
}

impl ItemStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Pipeline-wide status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Idle,
    Running,
    Paused,
}

/// One entry of the visible history.
///
/// Only the pending queue holds the uploaded bytes; history entries never do.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    /// File name; unique among items that are still queued or processing.
    pub id: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractedReceipt>,
    /// Id of the persisted receipt once the item succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueueItem {
    fn queued(id: String) -> Self {
        Self {
            id,
            status: ItemStatus::Queued,
            result: None,
            record_id: None,
            error: None,
        }
    }
}

/// A file handed to [`PipelineController::enqueue`].
#[derive(Debug, Clone)]
pub struct SubmittedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SubmittedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub status: PipelineStatus,
    /// Items still waiting to be claimed.
    pub queued: usize,
    pub active_workers: usize,
    pub items: Vec<QueueItem>,
}

/// Errors returned by pipeline control operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Reset was requested while workers are running.
    #[error("Pipeline is running; pause it before resetting")]
    Busy,
}

//! Status events published by the pipeline.

use serde::Serialize;

use super::{ItemStatus, PipelineStatus, QueueItem};
use crate::domain::ExtractedReceipt;

/// A single item transition.
#[derive(Debug, Clone, Serialize)]
pub struct ItemUpdate {
    pub item_id: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExtractedReceipt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&QueueItem> for ItemUpdate {
    fn from(item: &QueueItem) -> Self {
        Self {
            item_id: item.id.clone(),
            status: item.status,
            result: item.result.clone(),
            record_id: item.record_id,
            error: item.error.clone(),
        }
    }
}

/// Everything subscribers can observe, in the order it happened.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    Item(ItemUpdate),
    Pipeline { status: PipelineStatus },
    /// Queue and history were cleared.
    Reset,
}

impl StatusEvent {
    /// SSE event name.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Item(_) => "item",
            Self::Pipeline { .. } => "pipeline",
            Self::Reset => "reset",
        }
    }
}

//! Persistence for extracted receipts.
//!
//! # Providers
//!
//! - [`SqliteResultStore`] - sqlx/SQLite, the default
//! - [`MemoryResultStore`] - process-local maps, for tests and throwaway runs
//!
//! Every read returns receipts with their line items attached, newest purchase
//! date first and undated receipts last.

mod memory;
mod sqlite;

pub use memory::MemoryResultStore;
pub use sqlite::SqliteResultStore;

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::info;

use crate::config::StorageConfig;
use crate::domain::{ExtractedReceipt, SearchQuery, StoredReceipt};
use crate::normalize::normalize_store_name;

#[async_trait]
pub trait ResultStore: Send + Sync + std::fmt::Debug {
    /// Persist a receipt and its line items; returns the new receipt id.
    async fn save(&self, receipt: &ExtractedReceipt, file_name: &str) -> Result<i64>;

    async fn get(&self, id: i64) -> Result<Option<StoredReceipt>>;

    /// Delete a receipt and its line items. Returns whether it existed.
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Case-insensitive substring search on merchant and item description.
    ///
    /// Both filters must match when both are given; no filters lists everything.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<StoredReceipt>>;

    async fn list_all(&self) -> Result<Vec<StoredReceipt>>;

    /// Get the provider name for logging and debugging.
    fn provider_name(&self) -> &'static str;
}

/// Canonical merchant name stored next to the raw name.
pub(crate) fn canonical_merchant(receipt: &ExtractedReceipt) -> Option<String> {
    receipt
        .normalized_store_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| normalize_store_name(receipt.store_name.as_deref()))
}

/// Open the store selected by `config.provider`.
pub async fn connect(config: &StorageConfig) -> Result<Arc<dyn ResultStore>> {
    let store: Arc<dyn ResultStore> = match config.provider.as_str() {
        "memory" => Arc::new(MemoryResultStore::new()),
        "sqlite" => Arc::new(SqliteResultStore::new(&config.database_url).await?),
        other => bail!("unknown storage provider '{other}'"),
    };

    info!(
        name: "store.connected",
        provider = store.provider_name(),
        "Result store ready"
    );
    Ok(store)
}

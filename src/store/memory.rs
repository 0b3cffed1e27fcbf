use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use super::{ResultStore, canonical_merchant};
use crate::domain::{ExtractedReceipt, SearchQuery, StoredItem, StoredReceipt, sort_by_date_desc};

/// Thread-safe, process-local result store.
///
/// Cloning shares the underlying maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryResultStore {
    inner: Arc<MemoryStoreInner>,
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    state: RwLock<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    receipts: BTreeMap<i64, StoredReceipt>,
    next_receipt_id: i64,
    next_item_id: i64,
}

impl MemoryResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored receipts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read(|state| state.receipts.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read<R>(&self, f: impl FnOnce(&MemoryState) -> R) -> R {
        let guard = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn write<R>(&self, f: impl FnOnce(&mut MemoryState) -> R) -> R {
        let mut guard = self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    fn collect(&self, filter: impl Fn(&StoredReceipt) -> bool) -> Vec<StoredReceipt> {
        let mut receipts: Vec<StoredReceipt> = self.read(|state| {
            state
                .receipts
                .values()
                .filter(|receipt| filter(receipt))
                .cloned()
                .collect()
        });
        sort_by_date_desc(&mut receipts);
        receipts
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save(&self, receipt: &ExtractedReceipt, file_name: &str) -> Result<i64> {
        let normalized = canonical_merchant(receipt);
        let created_at = Utc::now().to_rfc3339();

        Ok(self.write(|state| {
            state.next_receipt_id += 1;
            let id = state.next_receipt_id;

            let items = receipt
                .items
                .iter()
                .map(|item| {
                    state.next_item_id += 1;
                    StoredItem {
                        id: state.next_item_id,
                        receipt_id: id,
                        description: item.description.clone(),
                        quantity: item.quantity,
                        price: item.price,
                    }
                })
                .collect();

            state.receipts.insert(
                id,
                StoredReceipt {
                    id,
                    file_name: file_name.to_string(),
                    date: receipt.date.clone(),
                    store_name: receipt.store_name.clone(),
                    normalized_store_name: normalized,
                    total_amount: receipt.total_amount,
                    currency: receipt.currency.clone(),
                    vat_amount: receipt.vat_amount,
                    items,
                    created_at,
                },
            );
            id
        }))
    }

    async fn get(&self, id: i64) -> Result<Option<StoredReceipt>> {
        Ok(self.read(|state| state.receipts.get(&id).cloned()))
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(self.write(|state| state.receipts.remove(&id).is_some()))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<StoredReceipt>> {
        let store_key = query.store_key();
        let item_key = query.item_key();

        Ok(self.collect(|receipt| {
            let store_matches = store_key.as_deref().is_none_or(|needle| {
                receipt
                    .normalized_store_name
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(needle))
            });
            let item_matches = item_key.as_deref().is_none_or(|needle| {
                receipt.items.iter().any(|item| {
                    item.description
                        .as_deref()
                        .is_some_and(|description| description.to_lowercase().contains(needle))
                })
            });
            store_matches && item_matches
        }))
    }

    async fn list_all(&self) -> Result<Vec<StoredReceipt>> {
        Ok(self.collect(|_| true))
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReceiptItem;

    fn receipt(store: &str, date: Option<&str>, items: &[&str]) -> ExtractedReceipt {
        ExtractedReceipt {
            date: date.map(str::to_string),
            store_name: Some(store.to_string()),
            items: items
                .iter()
                .map(|description| ReceiptItem {
                    description: Some((*description).to_string()),
                    quantity: Some(1.0),
                    price: Some(10.0),
                })
                .collect(),
            total_amount: Some(10.0),
            currency: Some("SEK".into()),
            ..ExtractedReceipt::default()
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let store = MemoryResultStore::new();
        let id = store
            .save(&receipt("ICA Maxi", Some("2024-01-05"), &["Mjölk", "Bröd"]), "a.pdf")
            .await
            .unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.file_name, "a.pdf");
        assert_eq!(stored.normalized_store_name.as_deref(), Some("ICA"));
        assert_eq!(stored.items.len(), 2);
        assert!(stored.items.iter().all(|item| item.receipt_id == id));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_intersection() {
        let store = MemoryResultStore::new();
        store
            .save(&receipt("ICA Nära", Some("2024-01-01"), &["MJÖLK 3%"]), "1.pdf")
            .await
            .unwrap();
        store
            .save(&receipt("Coop", Some("2024-02-01"), &["Mjölk"]), "2.pdf")
            .await
            .unwrap();
        store
            .save(&receipt("ICA Maxi", None, &["Kaffe"]), "3.pdf")
            .await
            .unwrap();

        let ica = store.search(&SearchQuery::new(Some("IcA"), None)).await.unwrap();
        assert_eq!(ica.len(), 2);
        // dated before undated
        assert_eq!(ica[0].file_name, "1.pdf");
        assert_eq!(ica[1].file_name, "3.pdf");

        let milk = store.search(&SearchQuery::new(None, Some("mjölk"))).await.unwrap();
        assert_eq!(milk.len(), 2);
        assert_eq!(milk[0].file_name, "2.pdf");

        let both = store
            .search(&SearchQuery::new(Some("ica"), Some("mjölk")))
            .await
            .unwrap();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].file_name, "1.pdf");

        let all = store.search(&SearchQuery::new(Some("  "), None)).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_removes_items() {
        let store = MemoryResultStore::new();
        let id = store
            .save(&receipt("Lidl", None, &["Äpple"]), "x.jpg")
            .await
            .unwrap();

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());
        assert!(store.get(id).await.unwrap().is_none());
        assert!(
            store
                .search(&SearchQuery::new(None, Some("äpple")))
                .await
                .unwrap()
                .is_empty()
        );
    }
}

use std::collections::HashMap;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::{ResultStore, canonical_merchant};
use crate::domain::{ExtractedReceipt, SearchQuery, StoredItem, StoredReceipt, sort_by_date_desc};

// Receipt ids bound per item query; SQLite caps bound parameters per statement
const HYDRATE_CHUNK: usize = 500;

const RECEIPT_COLUMNS: &str = "id, file_name, date, store_name, normalized_store_name, \
     total_amount, currency, vat_amount, created_at";

#[derive(Debug, Clone)]
pub struct SqliteResultStore {
    pool: SqlitePool,
}

impl SqliteResultStore {
    /// Open (creating if needed) the database at `database_url` and run migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to :memory: is its own database, so keep exactly one alive
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Attach line items to `rows` and apply the shared ordering.
    async fn hydrate(&self, rows: Vec<SqliteRow>) -> Result<Vec<StoredReceipt>> {
        let mut receipts = rows
            .iter()
            .map(receipt_from_row)
            .collect::<Result<Vec<_>>>()?;
        if receipts.is_empty() {
            return Ok(receipts);
        }

        let mut items: HashMap<i64, Vec<StoredItem>> = HashMap::new();
        for chunk in receipts.chunks(HYDRATE_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "SELECT id, receipt_id, description, quantity, price FROM receipt_items WHERE receipt_id IN (",
            );
            let mut ids = builder.separated(", ");
            for receipt in chunk {
                ids.push_bind(receipt.id);
            }
            ids.push_unseparated(") ORDER BY id");

            for row in builder.build().fetch_all(&self.pool).await? {
                let item = StoredItem {
                    id: row.try_get("id")?,
                    receipt_id: row.try_get("receipt_id")?,
                    description: row.try_get("description")?,
                    quantity: row.try_get("quantity")?,
                    price: row.try_get("price")?,
                };
                items.entry(item.receipt_id).or_default().push(item);
            }
        }

        for receipt in &mut receipts {
            receipt.items = items.remove(&receipt.id).unwrap_or_default();
        }
        sort_by_date_desc(&mut receipts);
        Ok(receipts)
    }
}

fn receipt_from_row(row: &SqliteRow) -> Result<StoredReceipt> {
    Ok(StoredReceipt {
        id: row.try_get("id")?,
        file_name: row.try_get("file_name")?,
        date: row.try_get("date")?,
        store_name: row.try_get("store_name")?,
        normalized_store_name: row.try_get("normalized_store_name")?,
        total_amount: row.try_get("total_amount")?,
        currency: row.try_get("currency")?,
        vat_amount: row.try_get("vat_amount")?,
        items: Vec::new(),
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ResultStore for SqliteResultStore {
    async fn save(&self, receipt: &ExtractedReceipt, file_name: &str) -> Result<i64> {
        let normalized = canonical_merchant(receipt);
        let store_key = normalized.as_deref().map(str::to_lowercase);
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO receipts (file_name, date, store_name, normalized_store_name, store_key,
                                  total_amount, currency, vat_amount, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(file_name)
        .bind(&receipt.date)
        .bind(&receipt.store_name)
        .bind(&normalized)
        .bind(&store_key)
        .bind(receipt.total_amount)
        .bind(&receipt.currency)
        .bind(receipt.vat_amount)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for item in &receipt.items {
            sqlx::query(
                r#"
                INSERT INTO receipt_items (receipt_id, description, description_key, quantity, price)
                VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(&item.description)
            .bind(item.description.as_deref().map(str::to_lowercase))
            .bind(item.quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn get(&self, id: i64) -> Result<Option<StoredReceipt>> {
        let row = sqlx::query(&format!("SELECT {RECEIPT_COLUMNS} FROM receipts WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM receipt_items WHERE receipt_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM receipts WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;
        Ok(deleted > 0)
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<StoredReceipt>> {
        let store_key = query.store_key();
        let item_key = query.item_key();

        // Keys are lower-cased in Rust; SQLite's lower() only folds ASCII
        let rows = sqlx::query(&format!(
            r#"
            SELECT {RECEIPT_COLUMNS} FROM receipts r
            WHERE (? IS NULL OR instr(r.store_key, ?) > 0)
              AND (? IS NULL OR EXISTS (
                    SELECT 1 FROM receipt_items i
                    WHERE i.receipt_id = r.id AND instr(i.description_key, ?) > 0))
            ORDER BY r.id
            "#
        ))
        .bind(&store_key)
        .bind(&store_key)
        .bind(&item_key)
        .bind(&item_key)
        .fetch_all(&self.pool)
        .await?;

        self.hydrate(rows).await
    }

    async fn list_all(&self) -> Result<Vec<StoredReceipt>> {
        let rows = sqlx::query(&format!("SELECT {RECEIPT_COLUMNS} FROM receipts ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(rows).await
    }

    fn provider_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ReceiptItem;

    async fn store() -> SqliteResultStore {
        SqliteResultStore::new("sqlite::memory:").await.unwrap()
    }

    fn receipt(store: &str, date: Option<&str>, items: &[&str]) -> ExtractedReceipt {
        ExtractedReceipt {
            date: date.map(str::to_string),
            store_name: Some(store.to_string()),
            items: items
                .iter()
                .map(|description| ReceiptItem {
                    description: Some((*description).to_string()),
                    quantity: None,
                    price: Some(12.5),
                })
                .collect(),
            total_amount: Some(25.0),
            currency: Some("SEK".into()),
            vat_amount: Some(5.0),
            ..ExtractedReceipt::default()
        }
    }

    #[tokio::test]
    async fn test_save_roundtrip() {
        let store = store().await;
        let id = store
            .save(&receipt("Systembolaget", Some("2024-03-01"), &["Vin", "Öl"]), "s.pdf")
            .await
            .unwrap();

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.store_name.as_deref(), Some("Systembolaget"));
        assert_eq!(stored.normalized_store_name.as_deref(), Some("Systembolaget"));
        assert_eq!(stored.vat_amount, Some(5.0));
        assert_eq!(stored.items.len(), 2);
        assert_eq!(stored.items[1].description.as_deref(), Some("Öl"));
        assert_eq!(stored.items[1].quantity, None);
        assert!(store.get(id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_folds_non_ascii() {
        let store = store().await;
        store
            .save(&receipt("Hemköp", Some("2024-01-02"), &["ÄGG 12-PACK"]), "a.pdf")
            .await
            .unwrap();
        store
            .save(&receipt("ICA", Some("2024-01-03"), &["Ägg"]), "b.pdf")
            .await
            .unwrap();

        let results = store
            .search(&SearchQuery::new(Some("HEMKÖP"), Some("ägg")))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].file_name, "a.pdf");

        let eggs = store.search(&SearchQuery::new(None, Some("ägg"))).await.unwrap();
        assert_eq!(eggs.len(), 2);
        assert_eq!(eggs[0].file_name, "b.pdf");
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let store = store().await;
        let id = store
            .save(&receipt("Coop", None, &["Smör"]), "c.pdf")
            .await
            .unwrap();

        assert!(store.delete(id).await.unwrap());
        assert!(!store.delete(id).await.unwrap());

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM receipt_items")
            .fetch_one(store.get_pool())
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_list_all_hydrates_past_one_chunk() {
        let store = store().await;
        let total = HYDRATE_CHUNK * 2 + 1;
        for n in 0..total {
            store
                .save(&receipt("Coop", None, &["Bröd"]), &format!("{n}.jpg"))
                .await
                .unwrap();
        }

        let receipts = store.list_all().await.unwrap();
        assert_eq!(receipts.len(), total);
        assert!(receipts.iter().all(|receipt| receipt.items.len() == 1));
        assert!(
            receipts
                .iter()
                .all(|receipt| receipt.items[0].receipt_id == receipt.id)
        );
    }

    #[tokio::test]
    async fn test_list_all_orders_by_date() {
        let store = store().await;
        for (name, date) in [("a", None), ("b", Some("2023-12-31")), ("c", Some("2024-06-01"))] {
            store
                .save(&receipt("Lidl", date, &[]), &format!("{name}.pdf"))
                .await
                .unwrap();
        }

        let names: Vec<String> = store
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|receipt| receipt.file_name)
            .collect();
        assert_eq!(names, vec!["c.pdf", "b.pdf", "a.pdf"]);
    }
}

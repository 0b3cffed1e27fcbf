use receipt_pipeline::config::StorageConfig;
use receipt_pipeline::domain::{ExtractedReceipt, ReceiptItem, SearchQuery};
use receipt_pipeline::store;

fn sqlite_config(dir: &tempfile::TempDir) -> StorageConfig {
    StorageConfig {
        provider: "sqlite".into(),
        database_url: format!("sqlite://{}", dir.path().join("receipts.db").display()),
    }
}

#[tokio::test]
async fn test_sqlite_receipts_survive_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");

    let id = {
        let store = store::connect(&sqlite_config(&dir)).await.unwrap();
        let receipt = ExtractedReceipt {
            date: Some("2024-05-01".into()),
            store_name: Some("Hemköp Fältöversten".into()),
            items: vec![ReceiptItem {
                description: Some("Räksmörgås".into()),
                quantity: Some(1.0),
                price: Some(89.0),
            }],
            total_amount: Some(89.0),
            currency: Some("SEK".into()),
            ..ExtractedReceipt::default()
        };
        store.save(&receipt, "lunch.jpg").await.unwrap()
    };

    let store = store::connect(&sqlite_config(&dir)).await.unwrap();
    assert_eq!(store.provider_name(), "sqlite");

    let stored = store.get(id).await.unwrap().expect("receipt persisted");
    assert_eq!(stored.file_name, "lunch.jpg");
    assert_eq!(stored.normalized_store_name.as_deref(), Some("Hemköp"));

    let hits = store
        .search(&SearchQuery::new(Some("HEMKÖP"), Some("RÄKSMÖRGÅS")))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].items[0].price, Some(89.0));
}

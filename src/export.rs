//! CSV export of stored receipts.
//!
//! Two flat tables: one row per receipt, and one row per line item keyed by
//! `receipt_id`.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::config::ExportKind;
use crate::domain::StoredReceipt;

#[derive(Debug, Serialize)]
struct ReceiptRow<'a> {
    id: i64,
    file_name: &'a str,
    date: Option<&'a str>,
    store_name: Option<&'a str>,
    normalized_store_name: Option<&'a str>,
    total_amount: Option<f64>,
    currency: Option<&'a str>,
    vat_amount: Option<f64>,
    item_count: usize,
    created_at: &'a str,
}

#[derive(Debug, Serialize)]
struct ItemRow<'a> {
    receipt_id: i64,
    item_id: i64,
    date: Option<&'a str>,
    store_name: Option<&'a str>,
    description: Option<&'a str>,
    quantity: Option<f64>,
    price: Option<f64>,
}

pub fn export_receipts_csv<W: Write>(receipts: &[StoredReceipt], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for receipt in receipts {
        csv.serialize(ReceiptRow {
            id: receipt.id,
            file_name: &receipt.file_name,
            date: receipt.date.as_deref(),
            store_name: receipt.store_name.as_deref(),
            normalized_store_name: receipt.normalized_store_name.as_deref(),
            total_amount: receipt.total_amount,
            currency: receipt.currency.as_deref(),
            vat_amount: receipt.vat_amount,
            item_count: receipt.items.len(),
            created_at: &receipt.created_at,
        })?;
    }
    csv.flush()?;
    Ok(())
}

pub fn export_items_csv<W: Write>(receipts: &[StoredReceipt], writer: W) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for receipt in receipts {
        for item in &receipt.items {
            csv.serialize(ItemRow {
                receipt_id: receipt.id,
                item_id: item.id,
                date: receipt.date.as_deref(),
                store_name: receipt.store_name.as_deref(),
                description: item.description.as_deref(),
                quantity: item.quantity,
                price: item.price,
            })?;
        }
    }
    csv.flush()?;
    Ok(())
}

/// Render the requested table into memory.
pub fn export_csv(kind: ExportKind, receipts: &[StoredReceipt]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    match kind {
        ExportKind::Receipts => export_receipts_csv(receipts, &mut buffer)?,
        ExportKind::Items => export_items_csv(receipts, &mut buffer)?,
    }
    Ok(buffer)
}

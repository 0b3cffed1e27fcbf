//! Receipt records exchanged between the extraction service, the pipeline and
//! the result store.

use std::cmp::Ordering;

use serde::{Deserialize, Deserializer, Serialize};

/// Currency assumed when the extraction service cannot identify one.
pub const DEFAULT_CURRENCY: &str = "SEK";

/// One purchased line on a receipt, as returned by the extraction service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptItem {
    #[serde(default)]
    pub description: Option<String>,
    /// Absent in the payload means "one of it"; an explicit `null` means the
    /// quantity could not be determined.
    #[serde(default = "ReceiptItem::default_quantity")]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
}

impl ReceiptItem {
    fn default_quantity() -> Option<f64> {
        Some(1.0)
    }
}

/// Structured output for one receipt image.
///
/// Field names on the wire follow the extraction instruction (`storeName`,
/// `totalAmount`, ...). A populated `error` marks a per-item failure; such an
/// entry occupies its position in a batch result but carries no data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedReceipt {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub store_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_store_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<ReceiptItem>,
    #[serde(default)]
    pub total_amount: Option<f64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub vat_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractedReceipt {
    /// An error-marked entry with every data field empty.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Fill in the defaults the extraction instruction promises.
    pub(crate) fn apply_defaults(&mut self) {
        let missing_currency = self
            .currency
            .as_deref()
            .is_none_or(|currency| currency.trim().is_empty());
        if missing_currency {
            self.currency = Some(DEFAULT_CURRENCY.to_string());
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<ReceiptItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ReceiptItem>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A line item as persisted by the result store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredItem {
    pub id: i64,
    pub receipt_id: i64,
    pub description: Option<String>,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
}

/// A receipt as persisted by the result store, with its line items attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredReceipt {
    pub id: i64,
    pub file_name: String,
    pub date: Option<String>,
    pub store_name: Option<String>,
    /// Canonical merchant name (see [`crate::normalize`]).
    pub normalized_store_name: Option<String>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub vat_amount: Option<f64>,
    pub items: Vec<StoredItem>,
    pub created_at: String, // RFC3339
}

/// Filters for [`crate::store::ResultStore::search`].
///
/// Blank filters count as absent; when both are absent every receipt matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchQuery {
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub item: Option<String>,
}

impl SearchQuery {
    pub fn new(store: Option<&str>, item: Option<&str>) -> Self {
        Self {
            store: store.map(str::to_string),
            item: item.map(str::to_string),
        }
    }

    /// Trimmed, lower-cased merchant filter.
    pub fn store_key(&self) -> Option<String> {
        search_key(self.store.as_deref())
    }

    /// Trimmed, lower-cased item description filter.
    pub fn item_key(&self) -> Option<String> {
        search_key(self.item.as_deref())
    }
}

fn search_key(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase)
}

/// Newest first, undated receipts last; ties keep their incoming order.
pub fn sort_by_date_desc(receipts: &mut [StoredReceipt]) {
    receipts.sort_by(|a, b| match (&a.date, &b.date) {
        (Some(left), Some(right)) => right.cmp(left),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

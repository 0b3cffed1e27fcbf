//! Parsing of the extraction service's batch response.

use serde_json::Value;
use tracing::warn;

use super::error::ExtractionError;
use crate::domain::ExtractedReceipt;

/// Message for positions the service left out of its answer.
pub const MISSING_RESULT: &str = "Missing result from AI for this item in the batch.";

/// Message for positions the service answered with `null`.
pub const EMPTY_RESULT: &str = "AI returned no data for this item.";

/// Strip an optional markdown code fence around the payload.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the response text for a batch of `expected` images.
///
/// The result always has exactly `expected` entries, aligned with the request:
/// missing trailing positions are padded with error entries, surplus entries
/// are dropped, and an entry that does not decode is replaced in place by an
/// error entry.
pub fn parse_batch_response(
    text: &str,
    expected: usize,
) -> Result<Vec<ExtractedReceipt>, ExtractionError> {
    let payload = strip_code_fence(text);
    if payload.is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }

    let value: Value = serde_json::from_str(payload)
        .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;
    let Value::Array(entries) = value else {
        return Err(ExtractionError::MalformedResponse(
            "expected a JSON array".to_string(),
        ));
    };

    if entries.len() != expected {
        warn!(
            sent = expected,
            received = entries.len(),
            "Mismatch in batch results; aligning to request length"
        );
    }

    let mut results: Vec<ExtractedReceipt> = entries
        .into_iter()
        .take(expected)
        .map(decode_entry)
        .collect();
    results.resize_with(expected, || ExtractedReceipt::failed(MISSING_RESULT));

    Ok(results)
}

fn decode_entry(entry: Value) -> ExtractedReceipt {
    match entry {
        Value::Object(_) => match serde_json::from_value::<ExtractedReceipt>(entry) {
            Ok(mut receipt) => {
                if !receipt.is_error() {
                    receipt.apply_defaults();
                }
                receipt
            }
            Err(e) => ExtractedReceipt::failed(format!("Malformed result from AI: {e}")),
        },
        Value::Null => ExtractedReceipt::failed(EMPTY_RESULT),
        other => ExtractedReceipt::failed(format!(
            "Malformed result from AI: expected an object, got {other}"
        )),
    }
}

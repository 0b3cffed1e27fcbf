//! Remote receipt extraction.
//!
//! A batch of page images goes out in one request; the answer is a JSON array
//! aligned with the request order. [`ExtractionClient`] owns the retry policy
//! and the optional request throttle, [`ExtractionTransport`] owns the wire.

mod client;
mod error;
mod prompt;
mod response;
mod retry;
mod transport;

pub use client::{ExtractionClient, ExtractionRateLimiter};
pub use error::{ExtractionError, QUOTA_PREFIX, is_quota_message};
pub use prompt::{DEFAULT_MODEL, RECEIPT_INSTRUCTION};
pub use response::{EMPTY_RESULT, MISSING_RESULT, parse_batch_response, strip_code_fence};
pub use retry::RetryPolicy;
pub use transport::{ExtractionRequest, ExtractionTransport, GeminiTransport};

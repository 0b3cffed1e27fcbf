//! Extraction failures.

/// Prefix carried by every quota-exhaustion message.
///
/// Batch failures are fanned out to per-item error strings, so upstream
/// callers recognise quota exhaustion from the message alone.
pub const QUOTA_PREFIX: &str = "QUOTA_EXCEEDED:";

/// Errors that can occur while calling the extraction service.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The client is missing credentials or an endpoint.
    #[error("Extraction service not configured: {0}")]
    NotConfigured(String),

    /// The request never produced an HTTP response.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The service is temporarily overloaded (HTTP 503). Retryable.
    #[error("Extraction service overloaded: {0}")]
    Overloaded(String),

    /// Quota or rate-limit exhaustion (HTTP 429). Retryable, and pauses the
    /// pipeline once retries are spent.
    #[error("QUOTA_EXCEEDED: {0}")]
    QuotaExceeded(String),

    /// Any other non-success status.
    #[error("Extraction service returned {status}: {message}")]
    Http { status: u16, message: String },

    /// The service answered without any text.
    #[error("Extraction service returned an empty response")]
    EmptyResponse,

    /// The response text was not a JSON array.
    #[error("Failed to parse JSON response from extraction service: {0}")]
    MalformedResponse(String),
}

impl ExtractionError {
    /// Classify a non-success HTTP status and its error message.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || message.to_lowercase().contains("quota") {
            Self::QuotaExceeded(message)
        } else if status == 503 {
            Self::Overloaded(message)
        } else {
            Self::Http { status, message }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Overloaded(_) | Self::QuotaExceeded(_))
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_))
    }
}

/// Whether an item error message reports quota exhaustion.
pub fn is_quota_message(message: &str) -> bool {
    message.starts_with(QUOTA_PREFIX)
}

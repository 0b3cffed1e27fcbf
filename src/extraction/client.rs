use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::InMemoryState;
use governor::state::direct::NotKeyed;
use governor::{Quota, RateLimiter};
use tracing::{debug, info, warn};

use super::error::ExtractionError;
use super::prompt::RECEIPT_INSTRUCTION;
use super::response::parse_batch_response;
use super::retry::RetryPolicy;
use super::transport::{ExtractionRequest, ExtractionTransport, GeminiTransport};
use crate::config::ExtractionConfig;
use crate::domain::ExtractedReceipt;
use crate::rasterize::PageImage;

pub type ExtractionRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Batched extraction with retry and optional client-side throttling.
#[derive(Clone)]
pub struct ExtractionClient {
    transport: Arc<dyn ExtractionTransport>,
    retry: RetryPolicy,
    limiter: Option<Arc<ExtractionRateLimiter>>,
    instruction: Arc<str>,
}

impl fmt::Debug for ExtractionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionClient")
            .field("transport", &self.transport)
            .field("retry", &self.retry)
            .field("throttled", &self.limiter.is_some())
            .finish_non_exhaustive()
    }
}

impl ExtractionClient {
    pub fn new(transport: Arc<dyn ExtractionTransport>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            limiter: None,
            instruction: Arc::from(RECEIPT_INSTRUCTION),
        }
    }

    /// Build the Gemini-backed client described by `config`.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let transport = GeminiTransport::new(
            config.base_url.clone(),
            config.model.clone(),
            config.resolved_api_key(),
            Duration::from_secs(config.timeout_secs),
        )?;

        if transport.is_configured() {
            info!(
                name: "extraction.configured",
                provider = transport.provider_name(),
                model = %config.model,
                max_retries = config.max_retries,
                "Extraction client configured"
            );
        } else {
            warn!(
                name: "extraction.unconfigured",
                "No extraction API key set; every batch will fail until one is provided"
            );
        }

        let client = Self::new(Arc::new(transport), config.retry_policy());
        Ok(match config.requests_per_minute.and_then(NonZeroU32::new) {
            Some(rpm) => client.with_rate_limit(rpm),
            None => client,
        })
    }

    /// Throttle outgoing calls to at most `per_minute` requests.
    #[must_use]
    pub fn with_rate_limit(mut self, per_minute: NonZeroU32) -> Self {
        self.limiter = Some(Arc::new(RateLimiter::direct(Quota::per_minute(per_minute))));
        self
    }

    #[must_use]
    pub fn with_instruction(mut self, instruction: impl Into<Arc<str>>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.transport.provider_name()
    }

    /// Extract one result per image, in input order.
    ///
    /// On success the returned vector has exactly `images.len()` entries.
    /// Errors apply to the whole batch; retryable errors are retried per the
    /// configured policy before being returned.
    pub async fn extract(
        &self,
        images: &[PageImage],
    ) -> Result<Vec<ExtractedReceipt>, ExtractionError> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let text = self
            .retry
            .run(|attempt| async move {
                if let Some(limiter) = &self.limiter {
                    limiter.until_ready().await;
                }
                debug!(
                    provider = self.transport.provider_name(),
                    attempt,
                    images = images.len(),
                    "Sending extraction batch"
                );
                self.transport
                    .send(ExtractionRequest {
                        images,
                        instruction: &self.instruction,
                    })
                    .await
            })
            .await?;

        parse_batch_response(&text, images.len())
    }
}

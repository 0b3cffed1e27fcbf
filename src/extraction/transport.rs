//! Wire transport to the remote extraction service.

use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use serde_json::{Value, json};

use super::error::ExtractionError;
use crate::rasterize::PageImage;

/// One batch request: the images in order plus the fixed instruction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub images: &'a [PageImage],
    pub instruction: &'a str,
}

/// Sends one batch to the remote service and returns its raw response text.
///
/// Implementations classify failures through [`ExtractionError::from_status`]
/// so the client can tell retryable conditions apart. They never retry on
/// their own.
#[async_trait]
pub trait ExtractionTransport: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: ExtractionRequest<'_>) -> Result<String, ExtractionError>;

    /// Get the provider name for logging and debugging.
    fn provider_name(&self) -> &'static str;
}

/// Google Gemini `generateContent` transport.
#[derive(Debug)]
pub struct GeminiTransport {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiTransport {
    /// Default Gemini API endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com";

    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// Check if the transport has credentials.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }

    fn build_body(request: ExtractionRequest<'_>) -> Value {
        let parts: Vec<Value> = request
            .images
            .iter()
            .map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": STANDARD.encode(&image.data),
                    }
                })
            })
            .collect();

        json!({
            "systemInstruction": { "parts": [{ "text": request.instruction }] },
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "responseMimeType": "application/json" },
        })
    }
}

/// Concatenated text parts of the first candidate.
fn response_text(body: &Value) -> Option<String> {
    let parts = body
        .get("candidates")?
        .get(0)?
        .get("content")?
        .get("parts")?
        .as_array()?;

    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();

    (!text.trim().is_empty()).then_some(text)
}

/// Error message from a Google-style error body, falling back to the raw text.
fn error_message(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|body| {
            body.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| raw.trim().to_string())
}

#[async_trait]
impl ExtractionTransport for GeminiTransport {
    async fn send(&self, request: ExtractionRequest<'_>) -> Result<String, ExtractionError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| {
            ExtractionError::NotConfigured("Gemini API key not configured".to_string())
        })?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&Self::build_body(request))
            .send()
            .await
            .map_err(|e| ExtractionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().await.unwrap_or_default();
            return Err(ExtractionError::from_status(
                status.as_u16(),
                error_message(&raw),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ExtractionError::MalformedResponse(e.to_string()))?;

        response_text(&body).ok_or(ExtractionError::EmptyResponse)
    }

    fn provider_name(&self) -> &'static str {
        "Gemini"
    }
}

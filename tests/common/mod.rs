//! Test doubles for the rasterizer, the extraction transport and the store.
#![allow(dead_code)]

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use receipt_pipeline::domain::{ExtractedReceipt, SearchQuery, StoredReceipt};
use receipt_pipeline::extraction::{
    ExtractionClient, ExtractionError, ExtractionRequest, ExtractionTransport, RetryPolicy,
};
use receipt_pipeline::pipeline::{
    PipelineController, PipelineServices, PipelineSettings, SubmittedFile,
};
use receipt_pipeline::rasterize::{PageImage, RasterizeError, Rasterizer};
use receipt_pipeline::store::{MemoryResultStore, ResultStore};
use serde_json::json;

/// Treats the payload as the page itself. `BROKEN` fails, `BLANK` has no
/// pages and `PANIC` panics.
#[derive(Debug, Default)]
pub struct FakeRasterizer;

#[async_trait]
impl Rasterizer for FakeRasterizer {
    async fn rasterize(&self, bytes: &[u8]) -> Result<Vec<PageImage>, RasterizeError> {
        match bytes {
            b"BROKEN" => Err(RasterizeError::Render("corrupt document".into())),
            b"BLANK" => Ok(Vec::new()),
            b"PANIC" => panic!("rasterizer exploded"),
            _ => Ok(vec![PageImage {
                mime_type: "image/jpeg".into(),
                data: bytes.to_vec(),
            }]),
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// Multi-page documents: every payload has three pages. Records the page
/// limit of each call and refuses unbounded renders.
#[derive(Debug, Default)]
pub struct MultiPageRasterizer {
    limits: Mutex<Vec<usize>>,
}

impl MultiPageRasterizer {
    pub fn limits(&self) -> Vec<usize> {
        self.limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Rasterizer for MultiPageRasterizer {
    async fn rasterize(&self, _bytes: &[u8]) -> Result<Vec<PageImage>, RasterizeError> {
        Err(RasterizeError::Render("rendered every page".into()))
    }

    async fn rasterize_pages(
        &self,
        bytes: &[u8],
        max_pages: usize,
    ) -> Result<Vec<PageImage>, RasterizeError> {
        self.limits.lock().unwrap().push(max_pages);
        Ok((0..max_pages.min(3))
            .map(|_| PageImage {
                mime_type: "image/jpeg".into(),
                data: bytes.to_vec(),
            })
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "multi-page"
    }
}

type Handler = dyn Fn(&[String]) -> Result<String, ExtractionError> + Send + Sync;

/// Scripted extraction service. The handler sees the page payloads of each
/// request as strings.
pub struct FakeTransport {
    handler: Box<Handler>,
    calls: AtomicU32,
    requests: Mutex<Vec<Vec<String>>>,
    gate: Option<Arc<tokio::sync::Semaphore>>,
}

impl fmt::Debug for FakeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeTransport")
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

impl FakeTransport {
    pub fn new(
        handler: impl Fn(&[String]) -> Result<String, ExtractionError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            calls: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    /// One well-formed receipt per page, with the page payload as store name.
    pub fn echo() -> Self {
        Self::new(|pages| Ok(echo_response(pages)))
    }

    /// Block every request until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<tokio::sync::Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn echo_response(pages: &[String]) -> String {
    let entries: Vec<_> = pages
        .iter()
        .map(|name| {
            json!({
                "date": "2024-01-01",
                "storeName": name,
                "items": [{ "description": format!("item from {name}"), "price": 10.0 }],
                "totalAmount": 10.0,
                "currency": "SEK",
                "vatAmount": 2.0
            })
        })
        .collect();
    serde_json::Value::Array(entries).to_string()
}

#[async_trait]
impl ExtractionTransport for FakeTransport {
    async fn send(&self, request: ExtractionRequest<'_>) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pages: Vec<String> = request
            .images
            .iter()
            .map(|image| String::from_utf8_lossy(&image.data).into_owned())
            .collect();
        self.requests.lock().unwrap().push(pages.clone());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        (self.handler)(&pages)
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// Store whose writes always fail.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl ResultStore for FailingStore {
    async fn save(&self, _receipt: &ExtractedReceipt, _file_name: &str) -> anyhow::Result<i64> {
        bail!("disk full")
    }

    async fn get(&self, _id: i64) -> anyhow::Result<Option<StoredReceipt>> {
        Ok(None)
    }

    async fn delete(&self, _id: i64) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn search(&self, _query: &SearchQuery) -> anyhow::Result<Vec<StoredReceipt>> {
        Ok(Vec::new())
    }

    async fn list_all(&self) -> anyhow::Result<Vec<StoredReceipt>> {
        Ok(Vec::new())
    }

    fn provider_name(&self) -> &'static str {
        "failing"
    }
}

pub fn no_backoff() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_delay: Duration::ZERO,
        max_jitter: Duration::ZERO,
    }
}

pub fn controller_with_store(
    transport: Arc<FakeTransport>,
    store: Arc<dyn ResultStore>,
    concurrent_limit: usize,
    batch_size: usize,
) -> PipelineController {
    controller_with(
        Arc::new(FakeRasterizer),
        transport,
        store,
        concurrent_limit,
        batch_size,
    )
}

pub fn controller_with(
    rasterizer: Arc<dyn Rasterizer>,
    transport: Arc<FakeTransport>,
    store: Arc<dyn ResultStore>,
    concurrent_limit: usize,
    batch_size: usize,
) -> PipelineController {
    let transport: Arc<dyn ExtractionTransport> = transport;
    PipelineController::new(
        PipelineServices {
            rasterizer,
            extractor: ExtractionClient::new(transport, no_backoff()),
            store,
        },
        PipelineSettings {
            concurrent_limit,
            batch_size,
        },
    )
}

pub fn controller(
    transport: Arc<FakeTransport>,
    concurrent_limit: usize,
    batch_size: usize,
) -> (PipelineController, MemoryResultStore) {
    let store = MemoryResultStore::new();
    let controller = controller_with_store(
        transport,
        Arc::new(store.clone()),
        concurrent_limit,
        batch_size,
    );
    (controller, store)
}

/// Files whose payload equals their name.
pub fn files(names: &[&str]) -> Vec<SubmittedFile> {
    names
        .iter()
        .map(|name| SubmittedFile::new(*name, name.as_bytes()))
        .collect()
}

pub async fn settle(controller: &PipelineController) {
    tokio::time::timeout(Duration::from_secs(10), controller.wait_until_settled())
        .await
        .expect("pipeline did not settle");
}

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use tracing::{debug, error, info, warn};

use super::controller::PipelineServices;
use super::state::{ItemOutcome, PipelineState, WorkItem};
use crate::domain::ExtractedReceipt;
use crate::extraction::{MISSING_RESULT, is_quota_message};
use crate::normalize::normalize_store_name;
use crate::rasterize::PageImage;

/// Pages sent for extraction per document; only the first page is used.
const PAGES_PER_DOCUMENT: usize = 1;

/// One pool slot. Claims sub-batches until the queue is empty, the pipeline
/// is paused, or its epoch is reset.
#[derive(Debug)]
pub(crate) struct Worker {
    pub id: u64,
    pub epoch: u64,
    pub batch_size: usize,
    pub state: Arc<PipelineState>,
    pub services: PipelineServices,
}

impl Worker {
    pub(crate) async fn run(self) {
        info!(name: "pipeline.worker.started", worker = self.id, "Worker started");
        let mut batches = 0_u64;

        while let Some(batch) = self.state.claim(self.epoch, self.batch_size) {
            batches += 1;
            debug!(
                worker = self.id,
                items = batch.len(),
                "Claimed sub-batch"
            );

            let failure = match AssertUnwindSafe(self.process(&batch)).catch_unwind().await {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("{err:#}")),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };

            if let Some(message) = failure {
                error!(
                    name: "pipeline.batch.failed",
                    worker = self.id,
                    error = %message,
                    "Sub-batch failed; marking unfinished items as errors"
                );
                for item in &batch {
                    self.state
                        .finish(self.epoch, &item.id, ItemOutcome::Failed(message.clone()));
                }
            }
        }

        info!(
            name: "pipeline.worker.stopped",
            worker = self.id,
            batches,
            "Worker stopped"
        );
    }

    fn fail(&self, item: &WorkItem, message: impl Into<String>) {
        self.state
            .finish(self.epoch, &item.id, ItemOutcome::Failed(message.into()));
    }

    /// Rasterize, extract and persist one sub-batch.
    async fn process(&self, batch: &[WorkItem]) -> anyhow::Result<()> {
        let rendered = join_all(
            batch
                .iter()
                .map(|item| {
                    self.services
                        .rasterizer
                        .rasterize_pages(&item.payload, PAGES_PER_DOCUMENT)
                }),
        )
        .await;

        let mut ready: Vec<(&WorkItem, PageImage)> = Vec::with_capacity(batch.len());
        for (item, pages) in batch.iter().zip(rendered) {
            match pages.map(|pages| pages.into_iter().next()) {
                Ok(Some(first_page)) => ready.push((item, first_page)),
                Ok(None) => self.fail(item, "rasterization failed: document has no pages"),
                Err(err) => {
                    warn!(item = %item.id, error = %err, "Rasterization failed");
                    self.fail(item, format!("rasterization failed: {err}"));
                }
            }
        }
        if ready.is_empty() {
            return Ok(());
        }

        let (items, images): (Vec<&WorkItem>, Vec<PageImage>) = ready.into_iter().unzip();
        let results = match self.services.extractor.extract(&images).await {
            Ok(results) => results,
            Err(err) => {
                warn!(
                    name: "pipeline.extraction.failed",
                    items = images.len(),
                    error = %err,
                    "Extraction failed for the whole sub-batch"
                );
                vec![ExtractedReceipt::failed(err.to_string()); images.len()]
            }
        };

        let mut results = results.into_iter();
        for item in items {
            let mut receipt = results
                .next()
                .unwrap_or_else(|| ExtractedReceipt::failed(MISSING_RESULT));

            if let Some(message) = receipt.error.take() {
                let quota = is_quota_message(&message);
                self.fail(item, message);
                if quota && self.state.pause_from(self.epoch) {
                    warn!(
                        name: "pipeline.paused.quota",
                        item = %item.id,
                        "Extraction quota exhausted; pipeline paused"
                    );
                }
                continue;
            }

            receipt.normalized_store_name = normalize_store_name(receipt.store_name.as_deref());
            let record_id = self.services.store.save(&receipt, &item.id).await?;
            self.state.finish(
                self.epoch,
                &item.id,
                ItemOutcome::Succeeded { receipt, record_id },
            );
        }

        Ok(())
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}

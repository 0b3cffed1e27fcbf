use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use super::state::{EnqueueReport, PipelineState};
use super::worker::Worker;
use super::{PipelineError, PipelineSnapshot, PipelineStatus, StatusEvent, SubmittedFile};
use crate::config::PipelineConfig;
use crate::extraction::ExtractionClient;
use crate::rasterize::Rasterizer;
use crate::store::ResultStore;

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Number of concurrent workers.
    pub concurrent_limit: usize,
    /// Items claimed per worker iteration and sent in one extraction request.
    pub batch_size: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrent_limit: 2,
            batch_size: 5,
        }
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            concurrent_limit: config.concurrent_limit.max(1),
            batch_size: config.batch_size.max(1),
        }
    }
}

/// The collaborators every worker drives a sub-batch through.
#[derive(Debug, Clone)]
pub struct PipelineServices {
    pub rasterizer: Arc<dyn Rasterizer>,
    pub extractor: ExtractionClient,
    pub store: Arc<dyn ResultStore>,
}

/// Operator-facing handle on the pipeline. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PipelineController {
    state: Arc<PipelineState>,
    services: PipelineServices,
    settings: PipelineSettings,
}

impl PipelineController {
    pub fn new(services: PipelineServices, settings: PipelineSettings) -> Self {
        Self {
            state: Arc::new(PipelineState::new()),
            services,
            settings,
        }
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.services.store
    }

    /// Queue files for processing; starts the pool when the pipeline is idle.
    pub fn enqueue(&self, files: Vec<SubmittedFile>) -> EnqueueReport {
        let report = self.state.enqueue(files);
        info!(
            name: "pipeline.enqueued",
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "Files enqueued"
        );

        if !report.accepted.is_empty() && self.state.status() == PipelineStatus::Idle {
            self.start();
        }
        report
    }

    /// Launch workers up to the concurrency limit. No-op while running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> PipelineStatus {
        if let Some(launch) = self.state.begin_launch(self.settings.concurrent_limit) {
            info!(
                name: "pipeline.pool.started",
                workers = launch.workers,
                batch_size = self.settings.batch_size,
                "Launching workers"
            );
            for offset in 0..launch.workers as u64 {
                let worker = Worker {
                    id: launch.first_worker + offset,
                    epoch: launch.epoch,
                    batch_size: self.settings.batch_size,
                    state: Arc::clone(&self.state),
                    services: self.services.clone(),
                };
                tokio::spawn(worker.run());
            }
        }
        self.state.status()
    }

    /// Stop claiming new sub-batches. In-flight sub-batches finish normally.
    pub fn pause(&self) -> PipelineStatus {
        if self.state.pause() {
            info!(name: "pipeline.paused", "Pipeline paused by operator");
        }
        self.state.status()
    }

    /// Restart the pool after a pause. No-op unless paused.
    pub fn resume(&self) -> PipelineStatus {
        if self.state.status() == PipelineStatus::Paused {
            info!(name: "pipeline.resumed", "Pipeline resumed");
            return self.start();
        }
        self.state.status()
    }

    /// Clear queue and history. Refused while running.
    pub fn reset(&self) -> Result<(), PipelineError> {
        self.state.reset()?;
        info!(name: "pipeline.reset", "Pipeline reset");
        Ok(())
    }

    pub fn status(&self) -> PipelineStatus {
        self.state.status()
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.state.subscribe()
    }

    /// Wait until no worker is active and the pipeline is idle or paused.
    pub async fn wait_until_settled(&self) {
        self.state.wait_until_settled().await;
    }
}

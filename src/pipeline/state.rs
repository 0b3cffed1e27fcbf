//! Shared queue, history and status.
//!
//! All mutations go through one `std::sync::Mutex`; the lock is never held
//! across an await point. Transitions are broadcast as [`StatusEvent`]s while
//! the lock is held so subscribers observe them in order.
//!
//! Every worker launch is stamped with the current epoch. A reset bumps the
//! epoch, so workers still finishing a sub-batch from before the reset can no
//! longer claim items or touch the new history.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{Notify, broadcast};
use tracing::info;

use super::events::{ItemUpdate, StatusEvent};
use super::{
    ItemStatus, PipelineError, PipelineSnapshot, PipelineStatus, QueueItem, SubmittedFile,
};
use crate::domain::ExtractedReceipt;

const EVENT_CAPACITY: usize = 1024;

/// A claimed unit of work.
#[derive(Debug, Clone)]
pub(crate) struct WorkItem {
    pub id: String,
    pub payload: Arc<[u8]>,
}

/// Final outcome of one item.
#[derive(Debug)]
pub(crate) enum ItemOutcome {
    Succeeded {
        receipt: ExtractedReceipt,
        record_id: i64,
    },
    Failed(String),
}

/// Workers to spawn after a successful [`PipelineState::begin_launch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Launch {
    pub epoch: u64,
    /// Sequence number of the first new worker, for logging.
    pub first_worker: u64,
    pub workers: usize,
}

/// A file refused by [`PipelineState::enqueue`].
#[derive(Debug, Clone, Serialize)]
pub struct RejectedFile {
    pub name: String,
    pub reason: String,
}

/// Outcome of an enqueue call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnqueueReport {
    pub accepted: Vec<String>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug)]
struct Inner {
    status: PipelineStatus,
    pending: VecDeque<WorkItem>,
    history: Vec<QueueItem>,
    active_workers: usize,
    launched_workers: u64,
    epoch: u64,
}

#[derive(Debug)]
pub struct PipelineState {
    inner: Mutex<Inner>,
    events: broadcast::Sender<StatusEvent>,
    settled: Notify,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                status: PipelineStatus::Idle,
                pending: VecDeque::new(),
                history: Vec::new(),
                active_workers: 0,
                launched_workers: 0,
                epoch: 0,
            }),
            events,
            settled: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: StatusEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_status(&self, inner: &mut Inner, status: PipelineStatus) {
        if inner.status != status {
            inner.status = status;
            info!(name: "pipeline.status", status = ?status, "Pipeline status changed");
            self.emit(StatusEvent::Pipeline { status });
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.events.subscribe()
    }

    pub fn status(&self) -> PipelineStatus {
        self.lock().status
    }

    pub fn active_workers(&self) -> usize {
        self.lock().active_workers
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        let inner = self.lock();
        PipelineSnapshot {
            status: inner.status,
            queued: inner.pending.len(),
            active_workers: inner.active_workers,
            items: inner.history.clone(),
        }
    }

    /// Append files to the history and the pending queue.
    ///
    /// A file is rejected while another item with the same name is still
    /// queued or processing.
    pub fn enqueue(&self, files: Vec<SubmittedFile>) -> EnqueueReport {
        let mut report = EnqueueReport::default();
        let mut inner = self.lock();

        let mut in_flight: HashSet<String> = inner
            .history
            .iter()
            .filter(|item| !item.status.is_terminal())
            .map(|item| item.id.clone())
            .collect();

        for file in files {
            if !in_flight.insert(file.name.clone()) {
                report.rejected.push(RejectedFile {
                    reason: "already queued or processing".to_string(),
                    name: file.name,
                });
                continue;
            }

            let item = QueueItem::queued(file.name);
            self.emit(StatusEvent::Item(ItemUpdate::from(&item)));
            inner.pending.push_back(WorkItem {
                id: item.id.clone(),
                payload: Arc::from(file.bytes),
            });
            report.accepted.push(item.id.clone());
            inner.history.push(item);
        }

        report
    }

    /// Move to `running` and reserve worker slots up to `limit`.
    ///
    /// Returns `None` when nothing should be spawned: the pipeline is already
    /// running, or there is no work. Without work the pipeline turns idle, or
    /// stays running until workers still finishing a sub-batch drop out.
    pub(crate) fn begin_launch(&self, limit: usize) -> Option<Launch> {
        let mut inner = self.lock();

        if inner.status == PipelineStatus::Running {
            return None;
        }
        if inner.pending.is_empty() {
            if inner.active_workers == 0 {
                self.set_status(&mut inner, PipelineStatus::Idle);
                self.settled.notify_waiters();
            } else {
                self.set_status(&mut inner, PipelineStatus::Running);
            }
            return None;
        }

        self.set_status(&mut inner, PipelineStatus::Running);
        let workers = limit.saturating_sub(inner.active_workers);
        let launch = Launch {
            epoch: inner.epoch,
            first_worker: inner.launched_workers + 1,
            workers,
        };
        inner.active_workers += workers;
        inner.launched_workers += workers as u64;
        Some(launch)
    }

    /// Take up to `batch_size` items from the front of the queue.
    ///
    /// `None` tells the worker to stop: the pipeline is paused, the queue is
    /// empty, or the worker belongs to an epoch that was reset. A stopping
    /// worker is removed from the active count here; the last one out of an
    /// empty running pipeline turns it idle.
    pub(crate) fn claim(&self, epoch: u64, batch_size: usize) -> Option<Vec<WorkItem>> {
        let mut inner = self.lock();

        if inner.epoch != epoch {
            return None;
        }

        if inner.status == PipelineStatus::Paused || inner.pending.is_empty() {
            inner.active_workers = inner.active_workers.saturating_sub(1);
            if inner.active_workers == 0
                && inner.pending.is_empty()
                && inner.status == PipelineStatus::Running
            {
                self.set_status(&mut inner, PipelineStatus::Idle);
            }
            self.settled.notify_waiters();
            return None;
        }

        let take = batch_size.max(1).min(inner.pending.len());
        let batch: Vec<WorkItem> = inner.pending.drain(..take).collect();

        for work in &batch {
            if let Some(item) = last_entry(&mut inner.history, &work.id) {
                item.status = ItemStatus::Processing;
                self.emit(StatusEvent::Item(ItemUpdate::from(&*item)));
            }
        }

        Some(batch)
    }

    /// Record the final outcome of a processing item.
    ///
    /// Returns `false` (and changes nothing) when the item is not currently
    /// processing, so every item is finalized at most once.
    pub(crate) fn finish(&self, epoch: u64, id: &str, outcome: ItemOutcome) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return false;
        }

        let Some(item) = last_entry(&mut inner.history, id) else {
            return false;
        };
        if item.status != ItemStatus::Processing {
            return false;
        }

        match outcome {
            ItemOutcome::Succeeded { receipt, record_id } => {
                item.status = ItemStatus::Success;
                item.result = Some(receipt);
                item.record_id = Some(record_id);
            }
            ItemOutcome::Failed(message) => {
                item.status = ItemStatus::Error;
                item.error = Some(message);
            }
        }
        self.emit(StatusEvent::Item(ItemUpdate::from(&*item)));
        true
    }

    /// Stop further claims. Returns whether the status changed.
    pub fn pause(&self) -> bool {
        let mut inner = self.lock();
        if inner.status == PipelineStatus::Paused {
            return false;
        }
        self.set_status(&mut inner, PipelineStatus::Paused);
        self.settled.notify_waiters();
        true
    }

    /// Pause on behalf of a worker from `epoch`; ignored after a reset.
    pub(crate) fn pause_from(&self, epoch: u64) -> bool {
        if self.lock().epoch != epoch {
            return false;
        }
        self.pause()
    }

    /// Discard queue, history and worker accounting.
    pub fn reset(&self) -> Result<(), PipelineError> {
        let mut inner = self.lock();
        if inner.status == PipelineStatus::Running {
            return Err(PipelineError::Busy);
        }

        inner.epoch += 1;
        inner.pending.clear();
        inner.history.clear();
        inner.active_workers = 0;
        inner.status = PipelineStatus::Idle;
        self.emit(StatusEvent::Reset);
        self.settled.notify_waiters();
        Ok(())
    }

    fn is_settled(&self) -> bool {
        let inner = self.lock();
        inner.active_workers == 0 && inner.status != PipelineStatus::Running
    }

    /// Wait until no worker is active and the pipeline is idle or paused.
    pub async fn wait_until_settled(&self) {
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_settled() {
                return;
            }
            notified.await;
        }
    }
}

fn last_entry<'a>(history: &'a mut [QueueItem], id: &str) -> Option<&'a mut QueueItem> {
    history.iter_mut().rev().find(|item| item.id == id)
}

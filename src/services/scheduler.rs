//! Worker pool: polls the scan queue and runs up to N scans at once.
//!
//! `tick` is one poll; `start` runs ticks on an interval until the returned
//! handle is shut down. Each dispatched scan holds a semaphore permit for
//! its whole run, so N also bounds concurrent detector processes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::orchestrator::ScanOrchestrator;
use super::scan_queue::{Enqueued, ScanQueue};
use crate::config::QueueSettings;
use crate::db::ScanStore;
use crate::error::AppResult;
use crate::models::{Priority, QueueStatus, RepoRef, ScanStatus, WorkItem};

pub struct Scheduler {
    queue: Arc<ScanQueue>,
    store: Arc<dyn ScanStore>,
    orchestrator: Arc<ScanOrchestrator>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    /// Background `pending` status posts, awaited before the item's scan
    /// starts so they never land after its final status.
    pending_marks: std::sync::Mutex<HashMap<Uuid, JoinHandle<()>>>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(
        queue: Arc<ScanQueue>,
        store: Arc<dyn ScanStore>,
        orchestrator: Arc<ScanOrchestrator>,
        settings: &QueueSettings,
    ) -> Self {
        Self {
            queue,
            store,
            orchestrator,
            permits: Arc::new(Semaphore::new(settings.max_concurrent_scans.max(1))),
            tasks: Mutex::new(JoinSet::new()),
            pending_marks: std::sync::Mutex::new(HashMap::new()),
            poll_interval: Duration::from_millis(settings.poll_interval_ms.max(1)),
        }
    }

    pub fn queue(&self) -> &Arc<ScanQueue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<dyn ScanStore> {
        &self.store
    }

    pub fn orchestrator(&self) -> &Arc<ScanOrchestrator> {
        &self.orchestrator
    }

    /// Queue a trigger, persist it and post a `pending` status in the background.
    pub async fn submit(&self, item: WorkItem) -> AppResult<Enqueued> {
        let priority = item.action.priority();
        self.submit_with_priority(item, priority).await
    }

    /// [`Scheduler::submit`] with an explicit priority, used by recovery.
    pub async fn submit_with_priority(&self, item: WorkItem, priority: Priority) -> AppResult<Enqueued> {
        let original_id = item.id;
        let enqueued = self.queue.enqueue(item, priority);

        if enqueued.item.id != original_id {
            debug!(target: "queue", item = %enqueued.item.id, "Trigger merged into existing entry");
            // A recovered row folded into another entry is not needed anymore.
            self.store.delete_queue_item(original_id).await?;
        }
        self.store.save_queue_item(&enqueued.item).await?;

        info!(
            target: "queue",
            item = %enqueued.item.id,
            repository = %enqueued.item.repository,
            pull_request = enqueued.item.pull_request,
            head_sha = %enqueued.item.head_sha,
            action = enqueued.item.action.as_str(),
            outcome = ?enqueued.outcome,
            "Scan queued"
        );

        let reporter = self.orchestrator.reporter().clone();
        let pending = enqueued.item.clone();
        let mark = tokio::spawn(async move {
            if let Err(e) = reporter.mark_pending(&pending).await {
                warn!(target: "queue", item = %pending.id, error = %e, "Failed to set pending status");
            }
        });
        // A replaced entry's earlier post is superseded by this one.
        if let Some(previous) = self.marks().insert(enqueued.item.id, mark) {
            previous.abort();
        }

        Ok(enqueued)
    }

    fn marks(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, JoinHandle<()>>> {
        self.pending_marks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop undispatched work for a closed pull request.
    pub async fn close_pull_request(&self, repository: &RepoRef, pull_request: u64) -> AppResult<usize> {
        let removed = self.queue.remove_pull_request(repository, pull_request);
        for item in &removed {
            if let Some(mark) = self.marks().remove(&item.id) {
                mark.abort();
            }
            self.store.delete_queue_item(item.id).await?;
        }
        if !removed.is_empty() {
            info!(
                target: "queue",
                repository = %repository,
                pull_request,
                removed = removed.len(),
                "Pull request closed, pending scans dropped"
            );
        }
        Ok(removed.len())
    }

    /// Dispatch pending items while permits are free. Returns how many started.
    pub async fn tick(&self) -> usize {
        let mut tasks = self.tasks.lock().await;
        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                error!(target: "scheduler", error = %e, "Scan task failed");
            }
        }

        let mut dispatched = 0;
        loop {
            let Ok(permit) = self.permits.clone().try_acquire_owned() else {
                break;
            };
            let Some(item) = self.queue.dequeue_next() else {
                break;
            };

            if let Err(e) = self
                .store
                .update_queue_item(item.id, QueueStatus::Scanning, item.attempts)
                .await
            {
                warn!(target: "scheduler", item = %item.id, error = %e, "Failed to mark item scanning");
            }

            debug!(target: "scheduler", item = %item.id, key = %item.key(), "Dispatching scan");
            let mark = self.marks().remove(&item.id);
            tasks.spawn(run_one(
                self.queue.clone(),
                self.store.clone(),
                self.orchestrator.clone(),
                item,
                mark,
                permit,
            ));
            dispatched += 1;
        }
        dispatched
    }

    /// Wait until every dispatched scan has finished.
    pub async fn wait_idle(&self) {
        let mut tasks = self.tasks.lock().await;
        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                error!(target: "scheduler", error = %e, "Scan task failed");
            }
        }
    }

    /// Number of scans currently holding a permit.
    pub fn running(&self) -> usize {
        self.queue.in_flight_len()
    }

    /// Poll on an interval until the handle is shut down.
    pub fn start(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let join = tokio::spawn(async move {
            info!(
                target: "scheduler",
                interval_ms = self.poll_interval.as_millis() as u64,
                max_concurrent = self.permits.available_permits(),
                "Scheduler started"
            );
            let mut ticker = interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            info!(target: "scheduler", running = self.running(), "Scheduler stopping, waiting for running scans");
            self.wait_idle().await;
            info!(target: "scheduler", "Scheduler stopped");
        });

        SchedulerHandle { shutdown, join }
    }
}

async fn run_one(
    queue: Arc<ScanQueue>,
    store: Arc<dyn ScanStore>,
    orchestrator: Arc<ScanOrchestrator>,
    item: WorkItem,
    pending_mark: Option<JoinHandle<()>>,
    permit: OwnedSemaphorePermit,
) {
    if let Some(mark) = pending_mark {
        let _ = mark.await;
    }

    let runner = orchestrator.clone();
    let task_item = item.clone();
    let outcome = match tokio::spawn(async move { runner.run(task_item).await }).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(target: "scheduler", item = %item.id, error = %e, "Scan task aborted");
            orchestrator
                .finish_failed(item.clone(), ScanStatus::InternalError, format!("scan task aborted: {}", e))
                .await
        }
    };

    if let Err(e) = store.delete_queue_item(item.id).await {
        warn!(target: "scheduler", item = %item.id, error = %e, "Failed to remove finished queue item");
    }
    if let Some(follow_up) = queue.complete(&item.key()) {
        debug!(
            target: "scheduler",
            item = %follow_up.id,
            head_sha = %follow_up.head_sha,
            "Follow-up promoted"
        );
    }
    debug!(target: "scheduler", item = %item.id, status = %outcome.status, "Scan slot released");
    drop(permit);
}

/// Stops a started scheduler.
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop polling and wait for running scans to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.join.await {
            error!(target: "scheduler", error = %e, "Scheduler task failed");
        }
    }
}

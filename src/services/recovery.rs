//! Startup recovery of persisted queue entries.
//!
//! Entries left in `scanning` were interrupted mid-scan: they go back to the
//! front of the queue with one more attempt, unless they already used up
//! their attempts, in which case they are finished as internal errors.
//! Entries still `pending` are re-queued behind them in creation order.

use tracing::{info, warn};

use super::scheduler::Scheduler;
use crate::db::ScanStore;
use crate::error::AppResult;
use crate::models::{Priority, QueueStatus, ScanStatus};

/// What recovery did with the persisted queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Interrupted scans put back at the front.
    pub resumed: usize,
    /// Undispatched entries re-queued in order.
    pub requeued: usize,
    /// Interrupted scans that exceeded the attempt limit.
    pub abandoned: usize,
}

pub async fn recover_queue(scheduler: &Scheduler, max_attempts: u32) -> AppResult<RecoveryReport> {
    let store = scheduler.store();
    let items = store.list_queue_items().await?;
    let mut report = RecoveryReport::default();

    let (interrupted, pending): (Vec<_>, Vec<_>) = items
        .into_iter()
        .partition(|item| item.status == QueueStatus::Scanning);

    // Front insertion reverses order, so walk newest first to keep the
    // oldest interrupted scan at the head.
    for mut item in interrupted.into_iter().rev() {
        item.attempts += 1;
        if item.attempts > max_attempts {
            warn!(
                target: "recovery",
                item = %item.id,
                repository = %item.repository,
                pull_request = item.pull_request,
                attempts = item.attempts,
                "Giving up on repeatedly interrupted scan"
            );
            let id = item.id;
            let message = format!("scan interrupted {} times, giving up", item.attempts);
            scheduler
                .orchestrator()
                .finish_failed(item, ScanStatus::InternalError, message)
                .await;
            store.delete_queue_item(id).await?;
            report.abandoned += 1;
            continue;
        }
        scheduler.submit_with_priority(item, Priority::Front).await?;
        report.resumed += 1;
    }

    for item in pending {
        scheduler.submit_with_priority(item, Priority::Normal).await?;
        report.requeued += 1;
    }

    info!(
        target: "recovery",
        resumed = report.resumed,
        requeued = report.requeued,
        abandoned = report.abandoned,
        "Queue recovered"
    );
    Ok(report)
}

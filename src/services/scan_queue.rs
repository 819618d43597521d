//! Ordered, deduplicating queue of pending scans.
//!
//! Holds three collections behind one mutex:
//! - `pending`: undispatched items, FIFO with front insertion for priority work;
//! - `in_flight`: items handed to a worker, keyed by work item key;
//! - `follow_ups`: the newest trigger for a key whose scan is in flight.
//!
//! A key has at most one pending entry and at most one follow-up. When the
//! in-flight scan for a key finishes its follow-up is moved to the front of
//! `pending`, so the pull request always ends up scanned at its latest push.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::debug;

use crate::models::{
    Priority, QueueEntry, QueueSnapshot, QueueStatus, RepoRef, WorkItem, WorkItemKey,
};

/// What `enqueue` did with the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Added as a new pending entry.
    Queued,
    /// Replaced the pending entry with the same key.
    Replaced,
    /// A scan for the key is running; stored as its follow-up.
    FollowUp,
}

impl EnqueueOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Replaced => "replaced",
            Self::FollowUp => "follow_up",
        }
    }
}

/// Result of [`ScanQueue::enqueue`].
#[derive(Debug, Clone)]
pub struct Enqueued {
    pub outcome: EnqueueOutcome,
    pub item: WorkItem,
}

impl Enqueued {
    fn new(outcome: EnqueueOutcome, item: WorkItem) -> Self {
        Self { outcome, item }
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<WorkItem>,
    in_flight: HashMap<WorkItemKey, WorkItem>,
    follow_ups: HashMap<WorkItemKey, WorkItem>,
}

/// Thread-safe scan queue shared by the intake path and the scheduler.
#[derive(Default)]
pub struct ScanQueue {
    state: Mutex<QueueState>,
}

impl ScanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        // Every mutation is a single collection operation, so a poisoned
        // guard still holds valid state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add an item. Idempotent per key, see module docs.
    ///
    /// A replaced entry hands its id (and, for normal priority, its
    /// creation time) to the newer trigger, so a persisted row for the key
    /// is overwritten rather than duplicated. The returned item is the one
    /// now held by the queue.
    pub fn enqueue(&self, mut item: WorkItem, priority: Priority) -> Enqueued {
        let key = item.key();
        item.priority = priority;
        item.status = QueueStatus::Pending;

        let mut state = self.lock();

        if state.in_flight.contains_key(&key) {
            debug!(key = %key, "Scan in flight, storing follow-up");
            if let Some(previous) = state.follow_ups.get(&key) {
                item.id = previous.id;
                item.created_at = previous.created_at;
            }
            state.follow_ups.insert(key, item.clone());
            return Enqueued::new(EnqueueOutcome::FollowUp, item);
        }

        let existing = state.pending.iter().position(|p| p.key() == key);
        let outcome = match (existing, priority) {
            (Some(index), Priority::Normal) => {
                // Keep the earlier slot; carry over the stronger priority.
                let previous = &state.pending[index];
                item.id = previous.id;
                item.created_at = previous.created_at;
                item.priority = previous.priority;
                state.pending[index] = item.clone();
                EnqueueOutcome::Replaced
            }
            (Some(index), Priority::Front) => {
                if let Some(previous) = state.pending.remove(index) {
                    item.id = previous.id;
                }
                state.pending.push_front(item.clone());
                EnqueueOutcome::Replaced
            }
            (None, Priority::Normal) => {
                state.pending.push_back(item.clone());
                EnqueueOutcome::Queued
            }
            (None, Priority::Front) => {
                state.pending.push_front(item.clone());
                EnqueueOutcome::Queued
            }
        };
        Enqueued::new(outcome, item)
    }

    /// Take the next pending item and mark it in flight.
    pub fn dequeue_next(&self) -> Option<WorkItem> {
        let mut state = self.lock();
        let mut item = state.pending.pop_front()?;
        item.status = QueueStatus::Scanning;
        state.in_flight.insert(item.key(), item.clone());
        Some(item)
    }

    /// Release the in-flight slot of `key`. Returns the follow-up that was
    /// promoted to the front of the queue, if any.
    pub fn complete(&self, key: &WorkItemKey) -> Option<WorkItem> {
        let mut state = self.lock();
        state.in_flight.remove(key);
        let follow_up = state.follow_ups.remove(key)?;
        if let Some(index) = state.pending.iter().position(|p| &p.key() == key) {
            state.pending.remove(index);
        }
        state.pending.push_front(follow_up.clone());
        Some(follow_up)
    }

    /// Drop the undispatched entry and follow-up for `key`. In-flight scans
    /// are not affected.
    pub fn remove(&self, key: &WorkItemKey) -> Vec<WorkItem> {
        let mut state = self.lock();
        let mut removed: Vec<WorkItem> = Vec::new();
        state.pending.retain(|p| {
            if &p.key() == key {
                removed.push(p.clone());
                false
            } else {
                true
            }
        });
        removed.extend(state.follow_ups.remove(key));
        removed
    }

    /// Drop every undispatched entry for a pull request, whatever its head.
    pub fn remove_pull_request(&self, repository: &RepoRef, pull_request: u64) -> Vec<WorkItem> {
        let mut state = self.lock();
        let matches =
            |item: &WorkItem| &item.repository == repository && item.pull_request == pull_request;

        let mut removed: Vec<WorkItem> = Vec::new();
        state.pending.retain(|p| {
            if matches(p) {
                removed.push(p.clone());
                false
            } else {
                true
            }
        });
        let keys: Vec<WorkItemKey> = state
            .follow_ups
            .iter()
            .filter(|(_, item)| matches(item))
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            removed.extend(state.follow_ups.remove(&key));
        }
        removed
    }

    pub fn is_in_flight(&self, key: &WorkItemKey) -> bool {
        self.lock().in_flight.contains_key(key)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Consistent copy of the queue.
    pub fn peek_all(&self) -> QueueSnapshot {
        let state = self.lock();
        let mut in_flight: Vec<QueueEntry> =
            state.in_flight.values().map(|i| entry(i, false)).collect();
        in_flight.sort_by_key(|e| e.created_at);
        let mut follow_ups: Vec<QueueEntry> =
            state.follow_ups.values().map(|i| entry(i, true)).collect();
        follow_ups.sort_by_key(|e| e.created_at);

        QueueSnapshot {
            in_flight,
            pending: state.pending.iter().map(|i| entry(i, false)).collect(),
            follow_ups,
        }
    }
}

fn entry(item: &WorkItem, follow_up: bool) -> QueueEntry {
    QueueEntry {
        id: item.id,
        repository: item.repository.full_name(),
        pull_request: item.pull_request,
        head_ref: item.head_ref.clone(),
        head_sha: item.head_sha.clone(),
        action: item.action,
        priority: item.priority,
        status: item.status,
        follow_up,
        attempts: item.attempts,
        created_at: item.created_at,
    }
}

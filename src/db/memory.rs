//! In-process [`ScanStore`] used by tests and database-less runs.

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    Catalog, HistoryQuery, License, LicenseAccess, QueueStatus, ScanDetail, ScanOutcome,
    ScanSummary, WorkItem,
};

use super::ScanStore;

#[derive(Default)]
struct MemoryState {
    queue: Vec<WorkItem>,
    scans: Vec<(Uuid, ScanOutcome)>,
    catalog: Catalog,
}

/// Keeps everything in a mutex-guarded struct. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the license catalog.
    pub async fn seed_catalog(&self, catalog: Catalog) {
        self.state.lock().await.catalog = catalog;
    }

    /// Stored outcomes, oldest first.
    pub async fn outcomes(&self) -> Vec<ScanOutcome> {
        self.state
            .lock()
            .await
            .scans
            .iter()
            .map(|(_, outcome)| outcome.clone())
            .collect()
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn save_queue_item(&self, item: &WorkItem) -> AppResult<()> {
        let mut state = self.state.lock().await;
        match state.queue.iter_mut().find(|q| q.id == item.id) {
            Some(existing) => *existing = item.clone(),
            None => state.queue.push(item.clone()),
        }
        Ok(())
    }

    async fn update_queue_item(
        &self,
        id: Uuid,
        status: QueueStatus,
        attempts: u32,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(item) = state.queue.iter_mut().find(|q| q.id == id) {
            item.status = status;
            item.attempts = attempts;
        }
        Ok(())
    }

    async fn delete_queue_item(&self, id: Uuid) -> AppResult<()> {
        self.state.lock().await.queue.retain(|q| q.id != id);
        Ok(())
    }

    async fn list_queue_items(&self) -> AppResult<Vec<WorkItem>> {
        let mut items = self.state.lock().await.queue.clone();
        items.sort_by_key(|item| (item.created_at, item.id));
        Ok(items)
    }

    async fn save_scan(&self, outcome: &ScanOutcome) -> AppResult<Uuid> {
        let id = Uuid::now_v7();
        self.state.lock().await.scans.push((id, outcome.clone()));
        Ok(id)
    }

    async fn list_scans(&self, query: &HistoryQuery) -> AppResult<(Vec<ScanSummary>, u64)> {
        let state = self.state.lock().await;
        let matching: Vec<ScanSummary> = state
            .scans
            .iter()
            .rev()
            .map(|(id, outcome)| outcome.summary(*id))
            .filter(|s| query.repository.as_ref().is_none_or(|r| &s.repository == r))
            .filter(|s| query.organization.as_ref().is_none_or(|o| &s.organization == o))
            .filter(|s| query.sender.as_ref().is_none_or(|u| s.sender.as_ref() == Some(u)))
            .collect();

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn find_scan(&self, id: Uuid) -> AppResult<Option<ScanDetail>> {
        let state = self.state.lock().await;
        Ok(state
            .scans
            .iter()
            .find(|(scan_id, _)| *scan_id == id)
            .map(|(scan_id, outcome)| outcome.detail(*scan_id)))
    }

    async fn load_catalog(&self) -> AppResult<Catalog> {
        Ok(self.state.lock().await.catalog.clone())
    }

    async fn register_unreviewed_licenses(&self, names: &[String]) -> AppResult<usize> {
        let mut state = self.state.lock().await;
        let mut added = 0;
        for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
            let known = state
                .catalog
                .licenses
                .iter()
                .any(|l| l.spdx_id.eq_ignore_ascii_case(name));
            if !known {
                state.catalog.licenses.push(License {
                    spdx_id: name.to_string(),
                    name: name.to_string(),
                    access: LicenseAccess::Unreviewed,
                    alternative_names: Vec::new(),
                    checklist_url: None,
                });
                added += 1;
            }
        }
        Ok(added)
    }
}

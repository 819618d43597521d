//! Scan history DTOs for the read API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::license::ConflictPair;
use super::scan::{FileFinding, ScanStatus};
use super::work_item::{Action, Priority, QueueStatus};
use super::Pagination;

/// One finished scan, as listed in history.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScanSummary {
    pub id: Uuid,
    /// `owner/name`
    pub repository: String,
    pub organization: String,
    pub pull_request: u64,
    pub pull_request_url: Option<String>,
    pub head_ref: String,
    pub head_sha: String,
    pub sender: Option<String>,
    pub action: Action,
    pub status: ScanStatus,
    pub status_description: String,
    pub has_issue: bool,
    pub repository_license: Option<String>,
    pub scanned_at: DateTime<Utc>,
}

/// Full scan record with findings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScanDetail {
    #[serde(flatten)]
    pub summary: ScanSummary,
    /// Source URL used for `blob` links.
    pub source_url: String,
    pub findings: Vec<FileFinding>,
    pub conflicts: Vec<ConflictPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// History filter. All filters are exact matches.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct HistoryQuery {
    /// `owner/name`
    pub repository: Option<String>,
    pub organization: Option<String>,
    pub sender: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl HistoryQuery {
    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }
}

/// Paged history response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScanListResponse {
    pub scans: Vec<ScanSummary>,
    pub pagination: Pagination,
}

/// Queue snapshot entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueEntry {
    pub id: Uuid,
    pub repository: String,
    pub pull_request: u64,
    pub head_ref: String,
    pub head_sha: String,
    pub action: Action,
    pub priority: Priority,
    pub status: QueueStatus,
    /// Waiting for an in-flight scan of the same key to finish.
    pub follow_up: bool,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

/// Queue snapshot response.
#[derive(Debug, Serialize, ToSchema)]
pub struct QueueSnapshot {
    pub in_flight: Vec<QueueEntry>,
    pub pending: Vec<QueueEntry>,
    pub follow_ups: Vec<QueueEntry>,
}

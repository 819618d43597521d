//! Domain models for the license pre-validation service.

use utoipa::ToSchema;

pub mod history;
pub mod license;
pub mod scan;
pub mod webhook;
pub mod work_item;

// Re-export commonly used types
pub use history::{
    HistoryQuery, QueueEntry, QueueSnapshot, ScanDetail, ScanListResponse, ScanSummary,
};
pub use license::{Catalog, Classification, ConflictPair, License, LicenseAccess};
pub use scan::{
    CommitState, ComponentRef, FileFinding, LicenseMatch, MatchKind, ScanOutcome, ScanPhase,
    ScanResult, ScanStatus,
};
pub use webhook::{NormalizedEvent, PullRequestEvent};
pub use work_item::{Action, Priority, QueueStatus, RepoRef, WorkItem, WorkItemKey};

/// Pagination metadata for responses.
#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    /// Create pagination metadata.
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(u64::from(limit.max(1))) as u32
        };

        Pagination {
            page,
            limit,
            total,
            total_pages,
        }
    }
}

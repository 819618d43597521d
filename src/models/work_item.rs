//! Work items: queued units of scan work tied to a pull-request head reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// What triggered a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Open,
    Update,
    Reopen,
    Rescan,
    SingleScan,
    BotScan,
    /// Never queued; clears undispatched entries for the pull request.
    Close,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Update => "update",
            Self::Reopen => "reopen",
            Self::Rescan => "rescan",
            Self::SingleScan => "single_scan",
            Self::BotScan => "bot_scan",
            Self::Close => "close",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "update" => Some(Self::Update),
            "reopen" => Some(Self::Reopen),
            "rescan" => Some(Self::Rescan),
            "single_scan" => Some(Self::SingleScan),
            "bot_scan" => Some(Self::BotScan),
            "close" => Some(Self::Close),
            _ => None,
        }
    }

    /// Map a GitHub `pull_request` event action. Unknown actions are ignored.
    pub fn from_github(action: &str) -> Option<Self> {
        match action {
            "opened" => Some(Self::Open),
            "reopened" => Some(Self::Reopen),
            "synchronize" => Some(Self::Update),
            "closed" => Some(Self::Close),
            _ => None,
        }
    }

    /// Manual and bot triggers jump the queue.
    pub fn priority(&self) -> Priority {
        match self {
            Self::Rescan | Self::SingleScan | Self::BotScan => Priority::Front,
            Self::Open | Self::Update | Self::Reopen | Self::Close => Priority::Normal,
        }
    }

    pub fn is_enqueueable(&self) -> bool {
        !matches!(self, Self::Close)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Queue insertion priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    Front,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Front => "front",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Self::Normal),
            "front" => Some(Self::Front),
            _ => None,
        }
    }
}

/// Position of a work item in the queue lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for dispatch.
    Pending,
    /// Handed to a worker.
    Scanning,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Scanning => "scanning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "scanning" => Some(Self::Scanning),
            _ => None,
        }
    }
}

/// Repository coordinates (`owner/name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse `owner/name` or a repository URL; the last two path segments win.
    pub fn parse(s: &str) -> Option<Self> {
        let trimmed = s.trim().trim_end_matches('/');
        let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
        let mut segments = trimmed.rsplit('/');
        let name = segments.next()?.trim();
        let owner = segments.next()?.trim();
        if owner.is_empty() || name.is_empty() || owner.contains(':') {
            return None;
        }
        Some(Self::new(owner, name))
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Dedup key: one undispatched entry per pull request head.
///
/// Branch names alone are not unique within a repository (forks opening
/// from `main`, one branch targeting two bases), so the pull request number
/// is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
pub struct WorkItemKey {
    pub repository: String,
    pub pull_request: u64,
    pub head_ref: String,
}

impl std::fmt::Display for WorkItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}@{}", self.repository, self.pull_request, self.head_ref)
    }
}

/// One queued scan request.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct WorkItem {
    pub id: Uuid,
    pub repository: RepoRef,
    /// Browser URL of the base repository.
    pub repository_url: String,
    pub pull_request: u64,
    pub pull_request_url: Option<String>,
    /// Branch name of the pull request head.
    pub head_ref: String,
    /// Commit the trigger referred to; refreshed at fetch time.
    pub head_sha: String,
    pub base_ref: Option<String>,
    /// Browser URL of the head repository when the pull request comes from a fork.
    pub fork_url: Option<String>,
    pub action: Action,
    pub sender: Option<String>,
    pub priority: Priority,
    pub status: QueueStatus,
    /// Times this item was recovered after an interrupted scan.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn key(&self) -> WorkItemKey {
        WorkItemKey {
            repository: self.repository.full_name(),
            pull_request: self.pull_request,
            head_ref: self.head_ref.clone(),
        }
    }

    /// URL used for `blob` links in reports.
    pub fn source_url(&self) -> &str {
        self.fork_url.as_deref().unwrap_or(&self.repository_url)
    }
}

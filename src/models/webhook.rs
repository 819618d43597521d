//! Inbound webhook payloads and the normalized event derived from them.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::work_item::{Action, QueueStatus, RepoRef, WorkItem};

/// Subset of a GitHub `pull_request` event the service reads.
#[derive(Debug, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub number: Option<u64>,
    pub pull_request: PullRequestPayload,
    pub repository: RepositoryPayload,
    pub sender: Option<AccountPayload>,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestPayload {
    pub number: u64,
    pub html_url: Option<String>,
    pub url: Option<String>,
    pub head: BranchPayload,
    pub base: BranchPayload,
}

#[derive(Debug, Deserialize)]
pub struct BranchPayload {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sha: String,
    pub repo: Option<RepositoryPayload>,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryPayload {
    pub html_url: String,
    pub full_name: Option<String>,
    #[serde(default)]
    pub fork: bool,
}

#[derive(Debug, Deserialize)]
pub struct AccountPayload {
    pub login: String,
}

/// Verified, normalized pull-request event.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct NormalizedEvent {
    pub action: Action,
    pub repository: RepoRef,
    pub repository_url: String,
    pub pull_request: u64,
    pub pull_request_url: Option<String>,
    pub head_ref: String,
    pub head_sha: String,
    pub base_ref: String,
    pub fork_url: Option<String>,
    pub sender: Option<String>,
}

impl NormalizedEvent {
    /// Normalize a parsed event. `None` when the action is not one the gate reacts to.
    pub fn from_pull_request_event(event: PullRequestEvent) -> Result<Option<Self>, String> {
        let Some(action) = Action::from_github(&event.action) else {
            return Ok(None);
        };

        let repository = event
            .repository
            .full_name
            .as_deref()
            .and_then(RepoRef::parse)
            .or_else(|| RepoRef::parse(&event.repository.html_url))
            .ok_or_else(|| format!("cannot parse repository '{}'", event.repository.html_url))?;

        let pr = event.pull_request;
        let fork_url = pr
            .head
            .repo
            .as_ref()
            .filter(|repo| repo.fork)
            .map(|repo| repo.html_url.clone());

        Ok(Some(Self {
            action,
            repository,
            repository_url: event.repository.html_url,
            pull_request: event.number.unwrap_or(pr.number),
            pull_request_url: pr.html_url,
            head_ref: pr.head.git_ref,
            head_sha: pr.head.sha,
            base_ref: pr.base.git_ref,
            fork_url,
            sender: event.sender.map(|s| s.login),
        }))
    }

    /// Build the queue entry for this event.
    pub fn into_work_item(self) -> WorkItem {
        WorkItem {
            id: Uuid::now_v7(),
            repository: self.repository,
            repository_url: self.repository_url,
            pull_request: self.pull_request,
            pull_request_url: self.pull_request_url,
            head_ref: self.head_ref,
            head_sha: self.head_sha,
            base_ref: Some(self.base_ref),
            fork_url: self.fork_url,
            priority: self.action.priority(),
            action: self.action,
            sender: self.sender,
            status: QueueStatus::Pending,
            attempts: 0,
            created_at: Utc::now(),
        }
    }
}

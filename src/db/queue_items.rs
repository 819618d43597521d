//! Database queries for the persisted scan queue.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use uuid::Uuid;

use crate::entity::queue_item::{self, ActiveModel, Entity as QueueItem};
use crate::error::{AppError, AppResult};
use crate::models::{Action, Priority, QueueStatus, RepoRef, WorkItem};

use super::DbPool;

impl DbPool {
    /// Insert a queue entry, or overwrite the one with the same id.
    pub async fn upsert_queue_item(&self, item: &WorkItem) -> AppResult<()> {
        let now = Utc::now();
        let model = ActiveModel {
            id: Set(item.id),
            repository: Set(item.repository.full_name()),
            repository_url: Set(item.repository_url.clone()),
            pull_request: Set(item.pull_request as i64),
            pull_request_url: Set(item.pull_request_url.clone()),
            head_ref: Set(item.head_ref.clone()),
            head_sha: Set(item.head_sha.clone()),
            base_ref: Set(item.base_ref.clone()),
            fork_url: Set(item.fork_url.clone()),
            action: Set(item.action.as_str().to_string()),
            sender: Set(item.sender.clone()),
            priority: Set(item.priority.as_str().to_string()),
            status: Set(item.status.as_str().to_string()),
            attempts: Set(item.attempts as i32),
            created_at: Set(item.created_at),
            updated_at: Set(now),
        };

        QueueItem::insert(model)
            .on_conflict(
                OnConflict::column(queue_item::Column::Id)
                    .update_columns([
                        queue_item::Column::PullRequest,
                        queue_item::Column::PullRequestUrl,
                        queue_item::Column::HeadRef,
                        queue_item::Column::HeadSha,
                        queue_item::Column::BaseRef,
                        queue_item::Column::ForkUrl,
                        queue_item::Column::Action,
                        queue_item::Column::Sender,
                        queue_item::Column::Priority,
                        queue_item::Column::Status,
                        queue_item::Column::Attempts,
                        queue_item::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to save queue item: {}", e)))?;

        Ok(())
    }

    /// Update status and attempt counter of a queue entry.
    pub async fn set_queue_item_status(
        &self,
        id: Uuid,
        status: QueueStatus,
        attempts: u32,
    ) -> AppResult<()> {
        let model = ActiveModel {
            id: Set(id),
            status: Set(status.as_str().to_string()),
            attempts: Set(attempts as i32),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };

        model.update(self.connection()).await.map_err(|e| match e {
            sea_orm::DbErr::RecordNotUpdated => {
                AppError::NotFound(format!("Queue item {} not found", id))
            }
            e => AppError::Database(format!("Failed to update queue item: {}", e)),
        })?;

        Ok(())
    }

    /// Delete a queue entry. Missing entries are not an error.
    pub async fn remove_queue_item(&self, id: Uuid) -> AppResult<()> {
        QueueItem::delete_by_id(id)
            .exec(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete queue item: {}", e)))?;
        Ok(())
    }

    /// All queue entries, oldest first.
    pub async fn get_queue_items(&self) -> AppResult<Vec<WorkItem>> {
        let rows = QueueItem::find()
            .order_by_asc(queue_item::Column::CreatedAt)
            .order_by_asc(queue_item::Column::Id)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list queue items: {}", e)))?;

        rows.into_iter().map(model_to_work_item).collect()
    }
}

fn model_to_work_item(m: queue_item::Model) -> AppResult<WorkItem> {
    let repository = RepoRef::parse(&m.repository).ok_or_else(|| {
        AppError::Database(format!("Queue item {} has invalid repository", m.id))
    })?;
    let action = Action::parse(&m.action).ok_or_else(|| {
        AppError::Database(format!("Queue item {} has unknown action '{}'", m.id, m.action))
    })?;
    let priority = Priority::parse(&m.priority).unwrap_or(Priority::Normal);
    let status = QueueStatus::parse(&m.status).unwrap_or(QueueStatus::Pending);

    Ok(WorkItem {
        id: m.id,
        repository,
        repository_url: m.repository_url,
        pull_request: m.pull_request.max(0) as u64,
        pull_request_url: m.pull_request_url,
        head_ref: m.head_ref,
        head_sha: m.head_sha,
        base_ref: m.base_ref,
        fork_url: m.fork_url,
        action,
        sender: m.sender,
        priority,
        status,
        attempts: m.attempts.max(0) as u32,
        created_at: m.created_at,
    })
}

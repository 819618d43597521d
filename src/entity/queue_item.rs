//! Persisted queue entry entity.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "queue_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub repository: String,
    pub repository_url: String,
    pub pull_request: i64,
    pub pull_request_url: Option<String>,
    pub head_ref: String,
    pub head_sha: String,
    pub base_ref: Option<String>,
    pub fork_url: Option<String>,
    pub action: String,
    pub sender: Option<String>,
    /// normal, front
    pub priority: String,
    /// pending, scanning
    pub status: String,
    pub attempts: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

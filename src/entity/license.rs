//! License catalog entity.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "licenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub spdx_id: String,
    pub name: String,
    /// permitted, restricted, prohibited, unreviewed
    pub access: String,
    /// JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub alternative_names: JsonValue,
    pub checklist_url: Option<String>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

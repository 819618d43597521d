//! Scan result entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "scan_results")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub queue_item_id: Uuid,
    pub repository: String,
    pub organization: String,
    pub repository_url: String,
    pub source_url: String,
    pub pull_request: i64,
    pub pull_request_url: Option<String>,
    pub head_ref: String,
    pub head_sha: String,
    pub sender: Option<String>,
    pub action: String,
    pub status: String,
    pub has_issue: bool,
    pub repository_license: Option<String>,
    #[sea_orm(column_type = "JsonBinary")]
    pub conflicts: JsonValue,
    #[sea_orm(column_type = "JsonBinary")]
    pub unreviewed_licenses: JsonValue,
    pub error_message: Option<String>,
    pub scanned_at: DateTimeUtc,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::detected_license::Entity")]
    DetectedLicenses,
}

impl Related<super::detected_license::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DetectedLicenses.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

//! Per-file finding entity.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "detected_licenses")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub scan_result_id: Uuid,
    pub file_path: String,
    pub classification: String,
    /// file, snippet
    pub match_kind: String,
    pub match_percent: i16,
    pub matched_lines: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub licenses: JsonValue,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub component: Option<JsonValue>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::scan_result::Entity",
        from = "Column::ScanResultId",
        to = "super::scan_result::Column::Id",
        on_delete = "Cascade"
    )]
    ScanResult,
}

impl Related<super::scan_result::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScanResult.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

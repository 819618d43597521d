//! Migration: Create detected_licenses table.
//!
//! Per-file findings of a scan result.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE detected_licenses (
                    id UUID PRIMARY KEY,
                    scan_result_id UUID NOT NULL REFERENCES scan_results(id) ON DELETE CASCADE,
                    file_path VARCHAR(1000) NOT NULL,
                    classification VARCHAR(20) NOT NULL
                        CHECK (classification IN ('permitted', 'restricted', 'prohibited', 'unreviewed')),
                    match_kind VARCHAR(10) NOT NULL CHECK (match_kind IN ('file', 'snippet')),
                    match_percent SMALLINT NOT NULL,
                    matched_lines VARCHAR(1000) NOT NULL,

                    -- [{name, identifier, access, checklist_url}]
                    licenses JSONB NOT NULL DEFAULT '[]'::jsonb,
                    -- {name, version, vendor, url, file_url, oss_lines}
                    component JSONB,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_detected_licenses_scan_result_id
                    ON detected_licenses(scan_result_id);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS detected_licenses CASCADE;")
            .await?;

        Ok(())
    }
}

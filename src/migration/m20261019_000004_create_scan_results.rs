//! Migration: Create scan_results table.
//!
//! One row per finished scan. Rows are never updated; a rescan adds a row.

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
                CREATE TABLE scan_results (
                    id UUID PRIMARY KEY, -- UUIDv7 for time-ordered sorting
                    queue_item_id UUID NOT NULL,
                    repository VARCHAR(255) NOT NULL,
                    organization VARCHAR(255) NOT NULL,
                    repository_url VARCHAR(1000) NOT NULL,
                    source_url VARCHAR(1000) NOT NULL,
                    pull_request BIGINT NOT NULL,
                    pull_request_url VARCHAR(1000),
                    head_ref VARCHAR(255) NOT NULL,
                    head_sha VARCHAR(64) NOT NULL,
                    sender VARCHAR(255),
                    action VARCHAR(20) NOT NULL,
                    status VARCHAR(20) NOT NULL
                        CHECK (status IN ('completed', 'issues_detected', 'internal_error', 'no_access')),
                    has_issue BOOLEAN NOT NULL DEFAULT FALSE,
                    repository_license VARCHAR(255),

                    -- [{first, second}]
                    conflicts JSONB NOT NULL DEFAULT '[]'::jsonb,
                    unreviewed_licenses JSONB NOT NULL DEFAULT '[]'::jsonb,

                    error_message TEXT,
                    scanned_at TIMESTAMPTZ NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_scan_results_repository ON scan_results(repository, scanned_at DESC);
                CREATE INDEX idx_scan_results_organization ON scan_results(organization, scanned_at DESC);
                CREATE INDEX idx_scan_results_sender ON scan_results(sender, scanned_at DESC);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS scan_results CASCADE;")
            .await?;

        Ok(())
    }
}

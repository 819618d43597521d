//! Migration: Create queue_items table.
//!
//! Durable copy of the in-memory scan queue, read back on startup to
//! recover work interrupted by a restart.

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
                CREATE TABLE queue_items (
                    id UUID PRIMARY KEY, -- UUIDv7 for time-ordered sorting
                    repository VARCHAR(255) NOT NULL, -- owner/name
                    repository_url VARCHAR(1000) NOT NULL,
                    pull_request BIGINT NOT NULL,
                    pull_request_url VARCHAR(1000),
                    head_ref VARCHAR(255) NOT NULL,
                    head_sha VARCHAR(64) NOT NULL,
                    base_ref VARCHAR(255),
                    fork_url VARCHAR(1000),
                    action VARCHAR(20) NOT NULL
                        CHECK (action IN ('open', 'update', 'reopen', 'rescan', 'single_scan', 'bot_scan')),
                    sender VARCHAR(255),
                    priority VARCHAR(10) NOT NULL DEFAULT 'normal'
                        CHECK (priority IN ('normal', 'front')),
                    status VARCHAR(20) NOT NULL DEFAULT 'pending'
                        CHECK (status IN ('pending', 'scanning')),
                    attempts INTEGER NOT NULL DEFAULT 0,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE INDEX idx_queue_items_pull_request
                    ON queue_items(repository, pull_request);

                CREATE TRIGGER update_queue_items_updated_at
                    BEFORE UPDATE ON queue_items
                    FOR EACH ROW
                    EXECUTE FUNCTION update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                DROP TRIGGER IF EXISTS update_queue_items_updated_at ON queue_items;
                DROP TABLE IF EXISTS queue_items CASCADE;
                "#,
            )
            .await?;

        Ok(())
    }
}

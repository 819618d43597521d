//! Migration: Create licenses table.
//!
//! The license catalog: one row per SPDX identifier with its access level and
//! the free-text names that resolve to it.

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
                CREATE OR REPLACE FUNCTION update_updated_at_column()
                RETURNS TRIGGER AS $$
                BEGIN
                    NEW.updated_at = NOW();
                    RETURN NEW;
                END;
                $$ LANGUAGE plpgsql;

                CREATE TABLE licenses (
                    id UUID PRIMARY KEY,
                    spdx_id VARCHAR(255) NOT NULL,
                    name VARCHAR(500) NOT NULL,
                    access VARCHAR(20) NOT NULL DEFAULT 'unreviewed'
                        CHECK (access IN ('permitted', 'restricted', 'prohibited', 'unreviewed')),

                    -- JSON array of alternative names, matched case-insensitively
                    alternative_names JSONB NOT NULL DEFAULT '[]'::jsonb,
                    checklist_url VARCHAR(1000),

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                CREATE UNIQUE INDEX idx_licenses_spdx_id_lower ON licenses(LOWER(spdx_id));

                CREATE TRIGGER update_licenses_updated_at
                    BEFORE UPDATE ON licenses
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
                DROP TRIGGER IF EXISTS update_licenses_updated_at ON licenses;
                DROP TABLE IF EXISTS licenses CASCADE;
                DROP FUNCTION IF EXISTS update_updated_at_column();
                "#,
            )
            .await?;

        Ok(())
    }
}

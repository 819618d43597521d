//! Migration: Create license_conflicts table.
//!
//! Pairs are stored with `license_a <= license_b` (case-insensitive) so each
//! unordered pair has exactly one row.

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
                CREATE TABLE license_conflicts (
                    id UUID PRIMARY KEY,
                    license_a VARCHAR(255) NOT NULL,
                    license_b VARCHAR(255) NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),

                    CHECK (LOWER(license_a) < LOWER(license_b))
                );

                CREATE UNIQUE INDEX idx_license_conflicts_pair
                    ON license_conflicts(LOWER(license_a), LOWER(license_b));
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS license_conflicts CASCADE;")
            .await?;

        Ok(())
    }
}

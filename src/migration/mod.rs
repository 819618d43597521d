//! SeaORM database migrations.

pub use sea_orm_migration::prelude::*;

mod m20261019_000001_create_licenses;
mod m20261019_000002_create_license_conflicts;
mod m20261019_000003_create_queue_items;
mod m20261019_000004_create_scan_results;
mod m20261019_000005_create_detected_licenses;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261019_000001_create_licenses::Migration),
            Box::new(m20261019_000002_create_license_conflicts::Migration),
            Box::new(m20261019_000003_create_queue_items::Migration),
            Box::new(m20261019_000004_create_scan_results::Migration),
            Box::new(m20261019_000005_create_detected_licenses::Migration),
        ]
    }
}

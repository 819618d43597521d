//! Database module providing connection management, migrations, and the
//! persistence interface used by the scan pipeline.

pub mod licenses;
pub mod memory;
pub mod queue_items;
pub mod scan_results;

use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::migration::Migrator;
use crate::models::{
    Catalog, HistoryQuery, QueueStatus, ScanDetail, ScanOutcome, ScanSummary, WorkItem,
};

pub use memory::MemoryStore;

/// Persistence operations the pipeline depends on.
#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Cheap connectivity check.
    async fn ping(&self) -> AppResult<()>;

    /// Insert or overwrite a persisted queue entry.
    async fn save_queue_item(&self, item: &WorkItem) -> AppResult<()>;

    async fn update_queue_item(&self, id: Uuid, status: QueueStatus, attempts: u32)
    -> AppResult<()>;

    async fn delete_queue_item(&self, id: Uuid) -> AppResult<()>;

    /// Every persisted queue entry, oldest first.
    async fn list_queue_items(&self) -> AppResult<Vec<WorkItem>>;

    /// Store a finished scan. Returns the history id.
    async fn save_scan(&self, outcome: &ScanOutcome) -> AppResult<Uuid>;

    /// Paged history, newest first, with the total number of matches.
    async fn list_scans(&self, query: &HistoryQuery) -> AppResult<(Vec<ScanSummary>, u64)>;

    async fn find_scan(&self, id: Uuid) -> AppResult<Option<ScanDetail>>;

    /// License catalog and conflict table.
    async fn load_catalog(&self) -> AppResult<Catalog>;

    /// Add catalog entries for license names nobody has reviewed yet.
    /// Returns how many were new.
    async fn register_unreviewed_licenses(&self, names: &[String]) -> AppResult<usize>;
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect using the configured PostgreSQL URL and pool bounds.
    pub async fn new(config: &Config) -> AppResult<Self> {
        let mut options = ConnectOptions::new(config.database.url.clone());
        options
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to database: {}", e)))?;

        Ok(DbPool { conn })
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply all pending migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None)
            .await
            .map_err(|e| AppError::Database(format!("Failed to run migrations: {}", e)))
    }
}

#[async_trait]
impl ScanStore for DbPool {
    async fn ping(&self) -> AppResult<()> {
        let stmt = sea_orm::Statement::from_string(
            sea_orm::DatabaseBackend::Postgres,
            "SELECT 1".to_owned(),
        );
        self.conn
            .query_one_raw(stmt)
            .await
            .map_err(|e| AppError::Database(format!("Database ping failed: {}", e)))?;
        Ok(())
    }

    async fn save_queue_item(&self, item: &WorkItem) -> AppResult<()> {
        self.upsert_queue_item(item).await
    }

    async fn update_queue_item(
        &self,
        id: Uuid,
        status: QueueStatus,
        attempts: u32,
    ) -> AppResult<()> {
        self.set_queue_item_status(id, status, attempts).await
    }

    async fn delete_queue_item(&self, id: Uuid) -> AppResult<()> {
        self.remove_queue_item(id).await
    }

    async fn list_queue_items(&self) -> AppResult<Vec<WorkItem>> {
        self.get_queue_items().await
    }

    async fn save_scan(&self, outcome: &ScanOutcome) -> AppResult<Uuid> {
        self.insert_scan_result(outcome).await
    }

    async fn list_scans(&self, query: &HistoryQuery) -> AppResult<(Vec<ScanSummary>, u64)> {
        self.query_scan_results(query).await
    }

    async fn find_scan(&self, id: Uuid) -> AppResult<Option<ScanDetail>> {
        self.get_scan_result(id).await
    }

    async fn load_catalog(&self) -> AppResult<Catalog> {
        licenses::load_catalog(&self.conn).await
    }

    async fn register_unreviewed_licenses(&self, names: &[String]) -> AppResult<usize> {
        licenses::insert_unreviewed(&self.conn, names).await
    }
}

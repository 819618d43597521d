//! SeaORM entity definitions for PostgreSQL database.

pub mod detected_license;
pub mod license;
pub mod license_conflict;
pub mod queue_item;
pub mod scan_result;

//! API endpoint modules.

pub mod health;
pub mod licenses;
pub mod openapi;
pub mod scans;
pub mod webhooks;

pub use health::configure_health_routes;
pub use licenses::configure_routes as configure_license_routes;
pub use openapi::ApiDoc;
pub use scans::configure_routes as configure_scan_routes;
pub use webhooks::configure_intake_routes as configure_webhook_intake_routes;
pub use webhooks::configure_routes as configure_webhook_routes;

//! Liveness and readiness probes.

use actix_web::{HttpResponse, get, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::ScanStore;
use crate::services::Scheduler;

/// Liveness response.
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: DateTime<Utc>,
}

/// Readiness response.
#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    status: &'static str,
    database: &'static str,
    /// Scans currently running.
    running_scans: usize,
    /// Scans waiting for a worker.
    pending_scans: usize,
    /// Licenses in the active conflict matrix.
    catalog_licenses: usize,
    catalog_loaded_at: DateTime<Utc>,
}

/// Liveness probe. Answers as long as the process serves HTTP.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

/// Readiness probe.
///
/// Webhooks are only worth accepting while the store is reachable, since
/// every queued item is persisted before it is acknowledged.
#[utoipa::path(
    get,
    path = "/api/v1/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Store unreachable", body = crate::error::ErrorResponse)
    )
)]
#[get("/ready")]
pub async fn ready(scheduler: web::Data<Scheduler>) -> HttpResponse {
    if let Err(e) = scheduler.store().ping().await {
        tracing::warn!(target: "api", error = %e, "Readiness check failed");
        return HttpResponse::ServiceUnavailable().json(crate::error::ErrorResponse {
            error: "NOT_READY".to_string(),
            message: "Scan store is unreachable".to_string(),
        });
    }

    let matrix = scheduler.orchestrator().matrix().snapshot().await;
    HttpResponse::Ok().json(ReadyResponse {
        status: "ready",
        database: "connected",
        running_scans: scheduler.running(),
        pending_scans: scheduler.queue().pending_len(),
        catalog_licenses: matrix.licenses().len(),
        catalog_loaded_at: matrix.loaded_at(),
    })
}

/// Configure health routes.
pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(health).service(ready);
}

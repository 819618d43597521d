//! License catalog endpoints.

use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::AdminAuth;
use crate::error::AppResult;
use crate::models::{ConflictPair, License};
use crate::services::{ConflictMatrix, Scheduler};

/// Catalog snapshot used for classification.
#[derive(Debug, Serialize, ToSchema)]
pub struct LicenseCatalogResponse {
    pub licenses: Vec<License>,
    pub conflicts: Vec<ConflictPair>,
    pub loaded_at: DateTime<Utc>,
}

impl From<&ConflictMatrix> for LicenseCatalogResponse {
    fn from(matrix: &ConflictMatrix) -> Self {
        Self {
            licenses: matrix.licenses(),
            conflicts: matrix.conflicts(),
            loaded_at: matrix.loaded_at(),
        }
    }
}

/// Licenses and conflicts currently in effect.
#[utoipa::path(
    get,
    path = "/api/v1/licenses",
    tag = "Licenses",
    responses(
        (status = 200, description = "License catalog", body = LicenseCatalogResponse),
    )
)]
pub async fn list_licenses(scheduler: web::Data<Scheduler>) -> AppResult<HttpResponse> {
    let matrix = scheduler.orchestrator().matrix().snapshot().await;
    Ok(HttpResponse::Ok().json(LicenseCatalogResponse::from(matrix.as_ref())))
}

/// Rebuild the catalog from the database.
///
/// Scans already running keep the catalog they started with. If the stored
/// catalog is inconsistent the previous one stays in effect.
#[utoipa::path(
    post,
    path = "/api/v1/licenses/reload",
    tag = "Licenses",
    responses(
        (status = 200, description = "Catalog reloaded", body = LicenseCatalogResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 500, description = "Catalog could not be rebuilt", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn reload_licenses(
    _auth: AdminAuth,
    scheduler: web::Data<Scheduler>,
) -> AppResult<HttpResponse> {
    let matrix = scheduler
        .orchestrator()
        .matrix()
        .reload(scheduler.store().as_ref())
        .await?;
    Ok(HttpResponse::Ok().json(LicenseCatalogResponse::from(matrix.as_ref())))
}

/// Configure license routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/licenses").route(web::get().to(list_licenses)))
        .service(web::resource("/licenses/reload").route(web::post().to(reload_licenses)));
}

//! OpenAPI documentation configuration.

use utoipa::OpenApi;

use crate::{api, error, models};

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "License Pre-Validation Server",
        version = "0.3.0",
        description = "Scans pull requests for open-source licenses and reports conflicts back to the VCS host"
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    paths(
        // Health endpoints
        api::health::health,
        api::health::ready,
        // Webhook endpoints
        api::webhooks::receive_webhook,
        api::webhooks::get_webhook_config,
        // Scan endpoints
        api::scans::trigger_scan,
        api::scans::get_queue,
        api::scans::list_scans,
        api::scans::get_scan,
        api::scans::get_scan_report,
        // License endpoints
        api::licenses::list_licenses,
        api::licenses::reload_licenses,
    ),
    components(
        schemas(
            // Common
            error::ErrorResponse,
            models::Pagination,
            // Health
            api::health::HealthResponse,
            api::health::ReadyResponse,
            // Webhooks
            api::webhooks::WebhookResponse,
            api::webhooks::WebhookConfigResponse,
            // Scans
            models::Action,
            models::Priority,
            models::QueueStatus,
            models::ScanStatus,
            models::MatchKind,
            models::ComponentRef,
            models::LicenseMatch,
            models::FileFinding,
            models::ScanSummary,
            models::ScanDetail,
            models::ScanListResponse,
            models::QueueEntry,
            models::QueueSnapshot,
            api::scans::ManualScanResponse,
            // Licenses
            models::LicenseAccess,
            models::License,
            models::ConflictPair,
            api::licenses::LicenseCatalogResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Webhooks", description = "Pull request webhook intake"),
        (name = "Scans", description = "Manual scans, queue and scan history"),
        (name = "Licenses", description = "License catalog and conflict table")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Add admin key security scheme.
struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "admin_key",
                utoipa::openapi::security::SecurityScheme::ApiKey(
                    utoipa::openapi::security::ApiKey::Header(
                        utoipa::openapi::security::ApiKeyValue::new(crate::config::ADMIN_KEY_HEADER),
                    ),
                ),
            );
        }
    }
}

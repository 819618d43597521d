//! Webhook intake and webhook configuration endpoints.

use actix_web::{HttpRequest, HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AdminAuth, WebhookVerifier};
use crate::config::{Config, SIGNATURE_HEADER};
use crate::error::{AppResult, AuthError};
use crate::models::{Action, NormalizedEvent, PullRequestEvent};
use crate::services::Scheduler;

/// Header naming the GitHub event type.
pub const EVENT_HEADER: &str = "X-GitHub-Event";

/// Outcome of a webhook delivery.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookResponse {
    /// `queued`, `closed`, `pong` or `ignored`
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<Uuid>,
    /// How the queue took the trigger: `queued`, `replaced` or `follow_up`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<&'static str>,
    /// Undispatched entries dropped by a close event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<usize>,
}

impl WebhookResponse {
    fn status(status: &'static str) -> Self {
        Self {
            status,
            item_id: None,
            outcome: None,
            removed: None,
        }
    }
}

/// What to enter on the VCS host when registering the webhook.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookConfigResponse {
    pub url: String,
    pub content_type: &'static str,
    pub events: Vec<&'static str>,
    pub secret_configured: bool,
    /// First 16 hex chars of the secret's SHA-256, for comparing deployments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_rotated_at: Option<DateTime<Utc>>,
}

/// Receive a pull-request webhook.
///
/// The body is verified against `X-Hub-Signature-256` before it is parsed.
/// Opened, reopened and synchronized pull requests are queued for scanning;
/// closed ones drop their undispatched scans. Other deliveries are acknowledged.
#[utoipa::path(
    post,
    path = "/webhooks",
    tag = "Webhooks",
    request_body(content = String, description = "GitHub pull_request event payload", content_type = "application/json"),
    responses(
        (status = 200, description = "Ping or close handled, or delivery ignored", body = WebhookResponse),
        (status = 202, description = "Scan queued", body = WebhookResponse),
        (status = 400, description = "Malformed payload", body = crate::error::ErrorResponse),
        (status = 403, description = "Signature rejected", body = crate::error::ErrorResponse),
    )
)]
pub async fn receive_webhook(
    req: HttpRequest,
    body: web::Bytes,
    verifier: web::Data<WebhookVerifier>,
    scheduler: web::Data<Scheduler>,
) -> AppResult<HttpResponse> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = verifier.verify(signature, &body) {
        warn!(target: "webhook", error = %e, "Webhook signature rejected");
        return Err(e.into());
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AuthError::MalformedPayload(e.to_string()))?;

    if payload.get("zen").is_some() {
        info!(target: "webhook", "Webhook ping received");
        return Ok(HttpResponse::Ok().json(WebhookResponse::status("pong")));
    }

    let event_type = req.headers().get(EVENT_HEADER).and_then(|v| v.to_str().ok());
    if let Some(event_type) = event_type
        && event_type != "pull_request"
    {
        debug!(target: "webhook", event = event_type, "Ignoring non pull_request event");
        return Ok(HttpResponse::Ok().json(WebhookResponse::status("ignored")));
    }

    let event: PullRequestEvent = serde_json::from_value(payload)
        .map_err(|e| AuthError::MalformedPayload(e.to_string()))?;
    let raw_action = event.action.clone();
    let Some(event) = NormalizedEvent::from_pull_request_event(event)
        .map_err(AuthError::MalformedPayload)?
    else {
        debug!(target: "webhook", action = %raw_action, "Ignoring pull request action");
        return Ok(HttpResponse::Ok().json(WebhookResponse::status("ignored")));
    };

    if event.action == Action::Close {
        let removed = scheduler
            .close_pull_request(&event.repository, event.pull_request)
            .await?;
        return Ok(HttpResponse::Ok().json(WebhookResponse {
            removed: Some(removed),
            ..WebhookResponse::status("closed")
        }));
    }

    let enqueued = scheduler.submit(event.into_work_item()).await?;
    Ok(HttpResponse::Accepted().json(WebhookResponse {
        item_id: Some(enqueued.item.id),
        outcome: Some(enqueued.outcome.as_str()),
        ..WebhookResponse::status("queued")
    }))
}

/// Webhook registration details.
#[utoipa::path(
    get,
    path = "/api/v1/webhooks/config",
    tag = "Webhooks",
    responses(
        (status = 200, description = "Webhook configuration", body = WebhookConfigResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn get_webhook_config(
    _auth: AdminAuth,
    config: web::Data<Config>,
    verifier: web::Data<WebhookVerifier>,
) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(WebhookConfigResponse {
        url: config.webhook_target_url(),
        content_type: "json",
        events: vec!["pull_request"],
        secret_configured: verifier.is_configured(),
        secret_fingerprint: verifier.fingerprint(),
        secret_rotated_at: config.webhook.secret_rotated_at,
    }))
}

/// Webhook intake, mounted at the root.
pub fn configure_intake_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/webhooks").route(web::post().to(receive_webhook)));
}

/// Webhook configuration, mounted under `/api/v1`.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/webhooks/config").route(web::get().to(get_webhook_config)));
}

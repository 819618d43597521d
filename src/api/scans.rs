//! Manual scan trigger, queue snapshot and scan history.

use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::AdminAuth;
use crate::db::ScanStore;
use crate::error::{AppError, AppResult};
use crate::models::{
    Action, HistoryQuery, NormalizedEvent, Pagination, QueueSnapshot, RepoRef, ScanDetail,
    ScanListResponse,
};
use crate::services::reporter::build_html_report;
use crate::services::Scheduler;

/// Query parameters of the manual trigger.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ManualScanQuery {
    /// `single_scan` (default), `rescan` or `bot_scan`
    pub action: Option<String>,
    /// Who asked for the scan, recorded in history.
    pub sender: Option<String>,
}

/// Manual trigger response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ManualScanResponse {
    pub item_id: Uuid,
    pub repository: String,
    pub pull_request: u64,
    pub head_sha: String,
    /// `queued`, `replaced` or `follow_up`
    pub outcome: &'static str,
}

fn manual_action(raw: Option<&str>) -> AppResult<Action> {
    match raw.map(Action::parse) {
        None => Ok(Action::SingleScan),
        Some(Some(action @ (Action::SingleScan | Action::Rescan | Action::BotScan))) => Ok(action),
        Some(_) => Err(AppError::InvalidInput(
            "action must be one of single_scan, rescan, bot_scan".to_string(),
        )),
    }
}

/// Queue a scan of a pull request at its current head.
///
/// Manual scans go to the front of the queue and follow the same
/// deduplication rules as webhook triggers.
#[utoipa::path(
    post,
    path = "/api/v1/scans/{owner}/{repo}/{number}",
    tag = "Scans",
    params(
        ("owner" = String, Path, description = "Repository owner"),
        ("repo" = String, Path, description = "Repository name"),
        ("number" = u64, Path, description = "Pull request number"),
        ManualScanQuery
    ),
    responses(
        (status = 202, description = "Scan queued", body = ManualScanResponse),
        (status = 400, description = "Invalid action", body = crate::error::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorResponse),
        (status = 404, description = "Pull request not found", body = crate::error::ErrorResponse),
        (status = 502, description = "VCS host error", body = crate::error::ErrorResponse),
    ),
    security(
        ("admin_key" = [])
    )
)]
pub async fn trigger_scan(
    _auth: AdminAuth,
    scheduler: web::Data<Scheduler>,
    path: web::Path<(String, String, u64)>,
    query: web::Query<ManualScanQuery>,
) -> AppResult<HttpResponse> {
    let (owner, name, number) = path.into_inner();
    let query = query.into_inner();
    let action = manual_action(query.action.as_deref())?;
    let repository = RepoRef::new(owner, name);

    let vcs = scheduler.orchestrator().vcs();
    vcs.authenticate(&repository).await?;
    let pr = vcs.fetch_pull_request(&repository, number).await?;

    let repository_url = pr
        .repository_url
        .clone()
        .unwrap_or_else(|| format!("https://github.com/{}", repository));
    let event = NormalizedEvent {
        action,
        repository: repository.clone(),
        repository_url,
        pull_request: number,
        pull_request_url: pr.html_url,
        head_ref: pr.head_ref,
        head_sha: pr.head_sha,
        base_ref: pr.base_ref,
        fork_url: pr.fork_url,
        sender: query.sender,
    };

    let enqueued = scheduler.submit(event.into_work_item()).await?;
    info!(
        target: "api",
        repository = %repository,
        pull_request = number,
        action = action.as_str(),
        "Manual scan requested"
    );

    Ok(HttpResponse::Accepted().json(ManualScanResponse {
        item_id: enqueued.item.id,
        repository: repository.full_name(),
        pull_request: number,
        head_sha: enqueued.item.head_sha,
        outcome: enqueued.outcome.as_str(),
    }))
}

/// Current queue contents.
#[utoipa::path(
    get,
    path = "/api/v1/queue",
    tag = "Scans",
    responses(
        (status = 200, description = "Queue snapshot", body = QueueSnapshot),
    )
)]
pub async fn get_queue(scheduler: web::Data<Scheduler>) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(scheduler.queue().peek_all()))
}

/// Scan history, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/scans",
    tag = "Scans",
    params(
        ("repository" = Option<String>, Query, description = "Filter by owner/name"),
        ("organization" = Option<String>, Query, description = "Filter by organization"),
        ("sender" = Option<String>, Query, description = "Filter by triggering user"),
        ("page" = Option<u32>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u32>, Query, description = "Results per page (default 20, max 100)")
    ),
    responses(
        (status = 200, description = "List of scans", body = ScanListResponse),
    )
)]
pub async fn list_scans(
    scheduler: web::Data<Scheduler>,
    query: web::Query<HistoryQuery>,
) -> AppResult<HttpResponse> {
    let query = query.into_inner();
    let (scans, total) = scheduler.store().list_scans(&query).await?;
    Ok(HttpResponse::Ok().json(ScanListResponse {
        scans,
        pagination: Pagination::new(query.page(), query.limit(), total),
    }))
}

async fn find_scan(scheduler: &Scheduler, id: Uuid) -> AppResult<ScanDetail> {
    scheduler
        .store()
        .find_scan(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Scan {}", id)))
}

/// One scan with its findings.
#[utoipa::path(
    get,
    path = "/api/v1/scans/{id}",
    tag = "Scans",
    params(
        ("id" = Uuid, Path, description = "Scan ID")
    ),
    responses(
        (status = 200, description = "Scan detail", body = ScanDetail),
        (status = 404, description = "Scan not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_scan(
    scheduler: web::Data<Scheduler>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let detail = find_scan(&scheduler, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// HTML report of one scan.
#[utoipa::path(
    get,
    path = "/api/v1/scans/{id}/report",
    tag = "Scans",
    params(
        ("id" = Uuid, Path, description = "Scan ID")
    ),
    responses(
        (status = 200, description = "HTML report", content_type = "text/html"),
        (status = 404, description = "Scan not found", body = crate::error::ErrorResponse),
    )
)]
pub async fn get_scan_report(
    scheduler: web::Data<Scheduler>,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let detail = find_scan(&scheduler, path.into_inner()).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(build_html_report(&detail)))
}

/// Configure scan routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/queue").route(web::get().to(get_queue)))
        .service(web::resource("/scans").route(web::get().to(list_scans)))
        .service(
            web::resource("/scans/{owner}/{repo}/{number}").route(web::post().to(trigger_scan)),
        )
        .service(web::resource("/scans/{id}").route(web::get().to(get_scan)))
        .service(web::resource("/scans/{id}/report").route(web::get().to(get_scan_report)));
}

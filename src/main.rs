//! License pre-validation server - main entry point.
//!
//! Recovers the persisted queue, starts the scan scheduler and serves the
//! webhook and operator API with Actix-web.

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http::header, web, App, HttpServer};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use lpvs_lib::api::{self, ApiDoc};
use lpvs_lib::auth::{AdminKey, WebhookVerifier};
use lpvs_lib::config::{Config, ADMIN_KEY_HEADER, SIGNATURE_HEADER};
use lpvs_lib::db::{DbPool, MemoryStore, ScanStore};
use lpvs_lib::middleware;
use lpvs_lib::services::{
    load_matrix, recover_queue, GitHubClient, LicenseDetector, ProcessDetector, Reporter,
    ScanOrchestrator, ScanQueue, Scheduler, SharedMatrix, VcsClient,
};

/// Perform health check (for Docker healthcheck).
fn health_check() -> bool {
    Config::from_env().is_ok()
}

fn exit_with(message: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", message, err);
    std::process::exit(1);
}

async fn open_store(config: &Config) -> Arc<dyn ScanStore> {
    if config.database.is_in_memory() {
        warn!("Using in-memory store: history and queue are lost on restart");
        return Arc::new(MemoryStore::new());
    }

    let pool = match DbPool::new(config).await {
        Ok(pool) => pool,
        Err(e) => exit_with("Failed to initialize database", e),
    };
    info!("Database connection established");

    if let Err(e) = pool.run_migrations().await {
        exit_with("Failed to run migrations", e);
    }
    info!("Database migrations complete");
    Arc::new(pool)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Check for --health-check flag (used by Docker HEALTHCHECK)
    if std::env::args().any(|arg| arg == "--health-check") {
        dotenvy::dotenv().ok();
        std::process::exit(if health_check() { 0 } else { 1 });
    }

    dotenvy::dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        std::process::exit(1);
    }

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            error!("");
            error!("Please check your environment variables:");
            error!("  - RUST_ENV must be set to 'development' or 'production'");
            error!("  - In production, DATABASE_URL, LPVS_WEBHOOK_SECRET and LPVS_GITHUB_TOKEN must be set");
            error!("  - In production, values must not match development defaults");
            std::process::exit(1);
        }
    };

    info!("========================================");
    info!("  License Pre-Validation Server");
    info!("  Environment: {}", config.environment);
    info!("========================================");

    if config.is_development() {
        warn!("Running in DEVELOPMENT mode - do not use in production!");
    }

    let store = open_store(&config).await;

    let matrix = match load_matrix(store.as_ref()).await {
        Ok(matrix) => matrix,
        Err(e) => exit_with("Failed to load license catalog", e),
    };
    info!(
        licenses = matrix.licenses().len(),
        conflicts = matrix.conflicts().len(),
        "License catalog loaded"
    );
    let matrix = SharedMatrix::new(matrix);

    if let Err(e) = tokio::fs::create_dir_all(&config.scanner.work_dir).await {
        exit_with("Failed to create scan work directory", e);
    }

    let vcs: Arc<dyn VcsClient> = match GitHubClient::new(&config.github) {
        Ok(client) => Arc::new(client),
        Err(e) => exit_with("Failed to build GitHub client", e),
    };
    if config.github.token.is_none() {
        warn!("LPVS_GITHUB_TOKEN is not set; only public repositories can be scanned");
    }

    let detector: Arc<dyn LicenseDetector> = Arc::new(ProcessDetector::new(&config.scanner));
    let reporter = Reporter::new(vcs.clone(), &config.reporter);
    let orchestrator = Arc::new(ScanOrchestrator::new(
        store.clone(),
        vcs,
        detector,
        matrix,
        reporter,
        config.scanner.work_dir.clone(),
        std::time::Duration::from_millis(config.queue.detector_retry_backoff_ms),
    ));
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(ScanQueue::new()),
        store,
        orchestrator,
        &config.queue,
    ));

    if let Err(e) = recover_queue(&scheduler, config.queue.max_attempts).await {
        exit_with("Failed to recover scan queue", e);
    }
    let scheduler_handle = scheduler.clone().start();

    let bind_address = config.bind_address();
    let admin_key = AdminKey::new(config.admin_key.clone());
    let verifier = WebhookVerifier::new(config.webhook.secret.clone());
    let is_development = config.is_development();

    if !verifier.is_configured() {
        warn!("LPVS_WEBHOOK_SECRET is not set; every webhook delivery will be rejected");
    }
    info!(
        "Webhook target: {} (events: pull_request)",
        config.webhook_target_url()
    );

    let worker_count = if is_development {
        info!(
            "Starting server at http://{} (4 workers - development mode)",
            bind_address
        );
        4
    } else {
        let cpus = num_cpus::get();
        info!(
            "Starting server at http://{} ({} workers)",
            bind_address, cpus
        );
        cpus
    };

    let scheduler_data = web::Data::from(scheduler.clone());
    let config_data = web::Data::new(config);
    let server = HttpServer::new(move || {
        let cors = if is_development {
            Cors::default()
                .allowed_origin("http://localhost:3000")
                .allowed_origin("http://127.0.0.1:3000")
        } else {
            Cors::default()
        }
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            header::ACCEPT,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-admin-key"),
        ])
        .max_age(3600);

        App::new()
            // Add CORS middleware (must be before other middleware)
            .wrap(cors)
            .wrap(middleware::RequestLogger)
            .app_data(scheduler_data.clone())
            .app_data(config_data.clone())
            .app_data(web::Data::new(admin_key.clone()))
            .app_data(web::Data::new(verifier.clone()))
            .configure(api::configure_webhook_intake_routes)
            .service(
                web::scope("/api/v1")
                    .configure(api::configure_health_routes)
                    .configure(api::configure_scan_routes)
                    .configure(api::configure_license_routes)
                    .configure(api::configure_webhook_routes),
            )
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
            )
    });

    info!(
        "Operator endpoints use the {} header; webhooks are verified with {}",
        ADMIN_KEY_HEADER, SIGNATURE_HEADER
    );

    // Actix stops the server on SIGINT/SIGTERM; running scans are drained after.
    let served = server
        .workers(worker_count)
        .bind(&bind_address)?
        .run()
        .await;

    info!("HTTP server stopped, draining scans");
    scheduler_handle.shutdown().await;
    info!("Shutdown complete");
    served
}

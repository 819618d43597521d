//! Shared test helpers for pipeline E2E tests.

use actix_web::{App, dev::ServiceResponse, test, web};
use lpvs_lib::auth::{AdminKey, WebhookVerifier};
use lpvs_lib::config::{
    Config, DatabaseSettings, Environment, GitHubSettings, QueueSettings, ReporterSettings,
    ScannerSettings, WebhookSettings,
};
use lpvs_lib::db::MemoryStore;
use lpvs_lib::models::{Catalog, License, LicenseAccess};
use lpvs_lib::services::{
    GitHubClient, ProcessDetector, Reporter, ScanOrchestrator, ScanQueue, Scheduler, SharedMatrix,
    ConflictMatrix,
};
use secrecy::SecretString;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::mock_github::{MockGitHub, MockPull};

/// Admin key used in tests.
pub const TEST_ADMIN_KEY: &str = "test-admin-key-for-pipeline-e2e";
/// Webhook secret used in tests.
pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const TEST_REPO: &str = "acme/widgets";

/// Reports every file as MIT, files mentioning GPL as GPL-3.0-only, and
/// files marked ORIGINAL as no match.
const DETECTOR_SCRIPT: &str = r#"root="$1"
cd "$root" || exit 2
find . -type f | sort | while read -r f; do
  p="${f#./}"
  if grep -q "ORIGINAL" "$f"; then
    printf '{"file":"%s","id":"none"}\n' "$p"
    continue
  fi
  if grep -q "GPL" "$f"; then lic="GPL-3.0-only"; else lic="MIT"; fi
  printf '{"file":"%s","id":"file","matched":"100%%","lines":"all","component":"demo-lib","version":"1.0.0","url":"https://example.com/demo-lib","licenses":[{"name":"%s"}]}\n' "$p" "$lic"
done
"#;

fn license(spdx_id: &str, access: LicenseAccess, alternative_names: &[&str]) -> License {
    License {
        spdx_id: spdx_id.to_string(),
        name: spdx_id.to_string(),
        access,
        alternative_names: alternative_names.iter().map(|n| n.to_string()).collect(),
        checklist_url: None,
    }
}

/// Catalog seeded into every test store.
pub fn test_catalog() -> Catalog {
    Catalog {
        licenses: vec![
            license("MIT", LicenseAccess::Permitted, &["MIT License"]),
            license("Apache-2.0", LicenseAccess::Permitted, &[]),
            license("GPL-2.0-only", LicenseAccess::Restricted, &[]),
            license("GPL-3.0-only", LicenseAccess::Prohibited, &["GNU GPL v3"]),
        ],
        conflicts: vec![("Apache-2.0".to_string(), "GPL-2.0-only".to_string())],
    }
}

/// Everything a test needs: the mock VCS host, the store and the pipeline.
pub struct TestEnv {
    pub mock: MockGitHub,
    pub store: Arc<MemoryStore>,
    pub scheduler: Arc<Scheduler>,
    pub config: Config,
    pub work_dir: TempDir,
}

fn test_config(api_url: &str, work_dir: &TempDir) -> Config {
    Config {
        environment: Environment::Development,
        host: "127.0.0.1".to_string(),
        port: 0,
        database: DatabaseSettings {
            url: DatabaseSettings::IN_MEMORY.to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        admin_key: Some(TEST_ADMIN_KEY.to_string()),
        github: GitHubSettings {
            token: Some(SecretString::from("ghp_pipeline_e2e".to_string())),
            api_url: api_url.to_string(),
        },
        webhook: WebhookSettings {
            secret: Some(SecretString::from(TEST_WEBHOOK_SECRET.to_string())),
            secret_rotated_at: None,
            public_url: "https://lpvs.test".to_string(),
        },
        scanner: ScannerSettings {
            command: "sh".to_string(),
            args: vec![work_dir.path().join("detector.sh").to_string_lossy().to_string()],
            timeout_secs: 30,
            work_dir: work_dir.path().join("scans"),
        },
        queue: QueueSettings {
            poll_interval_ms: 20,
            max_concurrent_scans: 2,
            max_attempts: 2,
            detector_retry_backoff_ms: 0,
        },
        reporter: ReporterSettings {
            max_attempts: 2,
            backoff_ms: 0,
        },
    }
}

/// Build the pipeline against a fresh mock GitHub and in-memory store.
pub async fn setup() -> TestEnv {
    let store = Arc::new(MemoryStore::new());
    store.seed_catalog(test_catalog()).await;
    setup_with_store(store).await
}

/// Same as [`setup`], with a store the test has already populated.
pub async fn setup_with_store(store: Arc<MemoryStore>) -> TestEnv {
    let mock = MockGitHub::start().await;
    let work_dir = TempDir::new().expect("failed to create work dir");
    std::fs::write(work_dir.path().join("detector.sh"), DETECTOR_SCRIPT)
        .expect("failed to write detector script");
    let config = test_config(&mock.api_url, &work_dir);
    std::fs::create_dir_all(&config.scanner.work_dir).expect("failed to create scan dir");

    let matrix = ConflictMatrix::build(test_catalog()).expect("test catalog is consistent");
    let vcs = Arc::new(GitHubClient::new(&config.github).expect("failed to build client"));
    let reporter = Reporter::new(vcs.clone(), &config.reporter);
    let orchestrator = Arc::new(ScanOrchestrator::new(
        store.clone(),
        vcs,
        Arc::new(ProcessDetector::new(&config.scanner)),
        SharedMatrix::new(matrix),
        reporter,
        config.scanner.work_dir.clone(),
        Duration::ZERO,
    ));
    let scheduler = Arc::new(Scheduler::new(
        Arc::new(ScanQueue::new()),
        store.clone(),
        orchestrator,
        &config.queue,
    ));

    TestEnv {
        mock,
        store,
        scheduler,
        config,
        work_dir,
    }
}

/// Create the HTTP app the way the server wires it.
pub async fn create_test_app(
    env: &TestEnv,
) -> impl actix_web::dev::Service<
    actix_http::Request,
    Response = ServiceResponse,
    Error = actix_web::Error,
> {
    test::init_service(
        App::new()
            .app_data(web::Data::from(env.scheduler.clone()))
            .app_data(web::Data::new(env.config.clone()))
            .app_data(web::Data::new(AdminKey::new(env.config.admin_key.clone())))
            .app_data(web::Data::new(WebhookVerifier::new(
                env.config.webhook.secret.clone(),
            )))
            .configure(lpvs_lib::api::configure_webhook_intake_routes)
            .service(
                web::scope("/api/v1")
                    .configure(lpvs_lib::api::configure_health_routes)
                    .configure(lpvs_lib::api::configure_scan_routes)
                    .configure(lpvs_lib::api::configure_license_routes)
                    .configure(lpvs_lib::api::configure_webhook_routes),
            ),
    )
    .await
}

/// Unified diff adding `lines` to a new file.
pub fn added_patch(lines: &[&str]) -> String {
    let mut patch = format!("@@ -0,0 +1,{} @@", lines.len());
    for line in lines {
        patch.push_str("\n+");
        patch.push_str(line);
    }
    patch
}

/// Register `number` on the mock with the given head and files.
pub fn add_pull(env: &TestEnv, number: u64, head_sha: &str, files: &[(&str, &[&str])]) {
    env.mock.add_pull(
        TEST_REPO,
        Some("Apache-2.0"),
        number,
        MockPull {
            head_ref: format!("feature-{}", number),
            head_sha: head_sha.to_string(),
            files: files
                .iter()
                .map(|(path, lines)| (path.to_string(), added_patch(lines)))
                .collect(),
        },
    );
}

/// GitHub `pull_request` event payload.
pub fn pr_event(action: &str, number: u64, head_sha: &str) -> Value {
    let repo_url = format!("https://github.com/{}", TEST_REPO);
    json!({
        "action": action,
        "number": number,
        "pull_request": {
            "number": number,
            "html_url": format!("{}/pull/{}", repo_url, number),
            "url": format!("https://api.github.com/repos/{}/pulls/{}", TEST_REPO, number),
            "head": {
                "ref": format!("feature-{}", number),
                "sha": head_sha,
                "repo": { "html_url": repo_url, "fork": false }
            },
            "base": { "ref": "main", "sha": "base000" }
        },
        "repository": { "html_url": repo_url, "full_name": TEST_REPO },
        "sender": { "login": "octocat" }
    })
}

/// Build a webhook delivery signed with the test secret.
pub fn signed_webhook(payload: &Value) -> test::TestRequest {
    let body = serde_json::to_vec(payload).unwrap();
    let signature = WebhookVerifier::new(Some(SecretString::from(TEST_WEBHOOK_SECRET.to_string())))
        .sign(&body)
        .unwrap();
    test::TestRequest::post()
        .uri("/webhooks")
        .insert_header(("X-GitHub-Event", "pull_request"))
        .insert_header(("X-GitHub-Delivery", "e2e-delivery"))
        .insert_header(("X-Hub-Signature-256", signature))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
}

/// Send a request and decode the JSON response.
pub async fn call_json<S>(app: &S, req: test::TestRequest) -> (u16, Value)
where
    S: actix_web::dev::Service<
            actix_http::Request,
            Response = ServiceResponse,
            Error = actix_web::Error,
        >,
{
    let resp = test::call_service(app, req.to_request()).await;
    let status = resp.status().as_u16();
    let body: Value = test::read_body_json(resp).await;
    (status, body)
}

/// Dispatch and finish everything queued, including promoted follow-ups.
pub async fn drain(env: &TestEnv) {
    for _ in 0..20 {
        env.scheduler.tick().await;
        env.scheduler.wait_idle().await;
        if env.scheduler.queue().pending_len() == 0 && env.scheduler.running() == 0 {
            return;
        }
    }
    panic!("queue did not drain");
}

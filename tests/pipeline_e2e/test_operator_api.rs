//! Admin-key protected endpoints and the read API.

use actix_web::test;
use lpvs_lib::models::{Action, LicenseAccess};

use super::test_helpers::*;

#[actix_rt::test]
async fn test_manual_scan_requires_admin_key() {
    let env = setup().await;
    add_pull(&env, 21, "manual", &[("src/a.c", &["int a;"])]);
    let app = create_test_app(&env).await;

    let uri = format!("/api/v1/scans/{}/21", TEST_REPO);
    let (status, body) = call_json(&app, test::TestRequest::post().uri(&uri)).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "UNAUTHORIZED");

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(("X-Admin-Key", "wrong"));
    let (status, _) = call_json(&app, req).await;
    assert_eq!(status, 401);
    assert_eq!(env.scheduler.queue().pending_len(), 0);
}

#[actix_rt::test]
async fn test_manual_scan_jumps_the_queue() {
    let env = setup().await;
    add_pull(&env, 21, "manual", &[("src/a.c", &["int a;"])]);
    let app = create_test_app(&env).await;

    call_json(&app, signed_webhook(&pr_event("opened", 30, "waiting"))).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/scans/{}/21?action=rescan&sender=operator", TEST_REPO))
        .insert_header(("X-Admin-Key", TEST_ADMIN_KEY));
    let (status, body) = call_json(&app, req).await;
    assert_eq!(status, 202, "unexpected response: {}", body);
    assert_eq!(body["head_sha"], "manual");
    assert_eq!(body["outcome"], "queued");

    let snapshot = env.scheduler.queue().peek_all();
    assert_eq!(snapshot.pending[0].pull_request, 21);
    assert_eq!(snapshot.pending[0].action, Action::Rescan);
    assert_eq!(snapshot.pending[1].pull_request, 30);
}

#[actix_rt::test]
async fn test_manual_scan_rejects_webhook_actions_and_unknown_pulls() {
    let env = setup().await;
    add_pull(&env, 21, "manual", &[("src/a.c", &["int a;"])]);
    let app = create_test_app(&env).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/scans/{}/21?action=open", TEST_REPO))
        .insert_header(("X-Admin-Key", TEST_ADMIN_KEY));
    let (status, _) = call_json(&app, req).await;
    assert_eq!(status, 400);

    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/scans/{}/999", TEST_REPO))
        .insert_header(("X-Admin-Key", TEST_ADMIN_KEY));
    let (status, _) = call_json(&app, req).await;
    assert_eq!(status, 404);
}

#[actix_rt::test]
async fn test_scan_detail_and_html_report() {
    let env = setup().await;
    add_pull(
        &env,
        12,
        "detail",
        &[("lib/gpl.c", &["/* GPL */", "int g;"]), ("lib/mit.c", &["int m;"])],
    );
    let app = create_test_app(&env).await;

    call_json(&app, signed_webhook(&pr_event("opened", 12, "detail"))).await;
    drain(&env).await;

    let (_, history) = call_json(
        &app,
        test::TestRequest::get().uri(&format!("/api/v1/scans?repository={}", TEST_REPO)),
    )
    .await;
    let id = history["scans"][0]["id"].as_str().unwrap().to_string();

    let (status, detail) =
        call_json(&app, test::TestRequest::get().uri(&format!("/api/v1/scans/{}", id))).await;
    assert_eq!(status, 200);
    assert_eq!(detail["status"], "issues_detected");
    assert_eq!(detail["findings"].as_array().unwrap().len(), 2);

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/api/v1/scans/{}/report", id))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status().as_u16(), 200);
    let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(html.contains("GPL-3.0-only"));
    assert!(html.contains("lib/mit.c"));

    let (status, _) = call_json(
        &app,
        test::TestRequest::get().uri(&format!("/api/v1/scans/{}", uuid::Uuid::now_v7())),
    )
    .await;
    assert_eq!(status, 404);
}

#[actix_rt::test]
async fn test_history_filters_by_sender() {
    let env = setup().await;
    add_pull(&env, 1, "one", &[("a.c", &["int a;"])]);
    add_pull(&env, 2, "two", &[("b.c", &["int b;"])]);
    let app = create_test_app(&env).await;

    call_json(&app, signed_webhook(&pr_event("opened", 1, "one"))).await;
    let req = test::TestRequest::post()
        .uri(&format!("/api/v1/scans/{}/2?sender=release-bot&action=bot_scan", TEST_REPO))
        .insert_header(("X-Admin-Key", TEST_ADMIN_KEY));
    call_json(&app, req).await;
    drain(&env).await;

    let (_, all) = call_json(&app, test::TestRequest::get().uri("/api/v1/scans")).await;
    assert_eq!(all["pagination"]["total"], 2);

    let (_, bot) =
        call_json(&app, test::TestRequest::get().uri("/api/v1/scans?sender=release-bot")).await;
    assert_eq!(bot["pagination"]["total"], 1);
    assert_eq!(bot["scans"][0]["pull_request"], 2);
    assert_eq!(bot["scans"][0]["action"], "bot_scan");
}

#[actix_rt::test]
async fn test_license_catalog_and_reload() {
    let env = setup().await;
    let app = create_test_app(&env).await;

    let (status, catalog) = call_json(&app, test::TestRequest::get().uri("/api/v1/licenses")).await;
    assert_eq!(status, 200);
    assert_eq!(catalog["licenses"].as_array().unwrap().len(), 4);
    assert_eq!(catalog["conflicts"].as_array().unwrap().len(), 1);

    let (status, _) =
        call_json(&app, test::TestRequest::post().uri("/api/v1/licenses/reload")).await;
    assert_eq!(status, 401);

    // An unreviewed name registered by a scan shows up after reload.
    use lpvs_lib::db::ScanStore;
    env.store
        .register_unreviewed_licenses(&["Beerware".to_string()])
        .await
        .unwrap();
    let req = test::TestRequest::post()
        .uri("/api/v1/licenses/reload")
        .insert_header(("X-Admin-Key", TEST_ADMIN_KEY));
    let (status, reloaded) = call_json(&app, req).await;
    assert_eq!(status, 200);
    let licenses = reloaded["licenses"].as_array().unwrap();
    assert_eq!(licenses.len(), 5);
    assert!(licenses.iter().any(|l| {
        l["spdx_id"] == "Beerware" && l["access"] == LicenseAccess::Unreviewed.as_str()
    }));
}

#[actix_rt::test]
async fn test_webhook_config_reports_fingerprint_only() {
    let env = setup().await;
    let app = create_test_app(&env).await;

    let (status, _) =
        call_json(&app, test::TestRequest::get().uri("/api/v1/webhooks/config")).await;
    assert_eq!(status, 401);

    let req = test::TestRequest::get()
        .uri("/api/v1/webhooks/config")
        .insert_header(("X-Admin-Key", TEST_ADMIN_KEY));
    let (status, config) = call_json(&app, req).await;
    assert_eq!(status, 200);
    assert_eq!(config["url"], "https://lpvs.test/webhooks");
    assert_eq!(config["events"][0], "pull_request");
    assert_eq!(config["secret_configured"], true);
    let fingerprint = config["secret_fingerprint"].as_str().unwrap();
    assert_eq!(fingerprint.len(), 16);
    assert!(!config.to_string().contains(TEST_WEBHOOK_SECRET));
}

#[actix_rt::test]
async fn test_health_and_readiness() {
    let env = setup().await;
    let app = create_test_app(&env).await;

    let (status, body) = call_json(&app, test::TestRequest::get().uri("/api/v1/health")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");

    let (status, body) = call_json(&app, test::TestRequest::get().uri("/api/v1/ready")).await;
    assert_eq!(status, 200);
    assert_eq!(body["database"], "connected");
    assert_eq!(body["pending_scans"], 0);
    assert_eq!(body["catalog_licenses"], 4);
}

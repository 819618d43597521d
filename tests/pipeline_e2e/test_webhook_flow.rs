//! Webhook intake through to the report on the pull request.

use actix_web::test;
use lpvs_lib::services::reporter::REPORT_MARKER;
use serde_json::Value;

use super::test_helpers::*;

#[actix_rt::test]
async fn test_opened_pull_request_with_permitted_license_passes() {
    let env = setup().await;
    add_pull(&env, 42, "abc123", &[("src/util.c", &["int add(int a, int b);"])]);
    let app = create_test_app(&env).await;

    let (status, body) = call_json(&app, signed_webhook(&pr_event("opened", 42, "abc123"))).await;
    assert_eq!(status, 202, "unexpected response: {}", body);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["outcome"], "queued");
    assert_eq!(env.scheduler.queue().pending_len(), 1);

    drain(&env).await;

    let states: Vec<String> = env.mock.statuses().into_iter().map(|s| s.state).collect();
    assert_eq!(states, vec!["pending", "success"]);
    let last = env.mock.statuses().pop().unwrap();
    assert_eq!(last.sha, "abc123");
    assert_eq!(last.context, "[License Pre-Validation Service]");
    assert_eq!(last.description, "No license issue detected");

    let comments = env.mock.comments();
    assert_eq!(comments.len(), 1);
    assert!(comments[0].body.starts_with(REPORT_MARKER));
    assert!(comments[0].body.contains("No license issue detected"));
    assert!(comments[0].body.contains("`src/util.c`"));

    let (status, history) = call_json(&app, test::TestRequest::get().uri("/api/v1/scans")).await;
    assert_eq!(status, 200);
    assert_eq!(history["pagination"]["total"], 1);
    assert_eq!(history["scans"][0]["status"], "completed");
    assert_eq!(history["scans"][0]["has_issue"], false);
    assert_eq!(history["scans"][0]["sender"], "octocat");
}

#[actix_rt::test]
async fn test_prohibited_license_fails_the_gate() {
    let env = setup().await;
    add_pull(
        &env,
        7,
        "def456",
        &[
            ("vendor/gpl.c", &["/* GPL code */", "int x;"]),
            ("src/ok.c", &["int y;"]),
        ],
    );
    let app = create_test_app(&env).await;

    let (status, _) = call_json(&app, signed_webhook(&pr_event("opened", 7, "def456"))).await;
    assert_eq!(status, 202);
    drain(&env).await;

    let last = env.mock.statuses().pop().unwrap();
    assert_eq!(last.state, "failure");
    assert_eq!(last.description, "Potential license problem(s) detected");

    let body = &env.mock.comments()[0].body;
    assert!(body.contains("Potential license problem(s) detected"));
    assert!(body.contains("GPL-3.0-only"));

    let outcome = env.store.outcomes().await.pop().unwrap();
    let result = outcome.result.unwrap();
    assert!(result.has_issue);
    assert_eq!(result.findings.len(), 2);
}

#[actix_rt::test]
async fn test_new_push_edits_existing_comment() {
    let env = setup().await;
    add_pull(&env, 3, "first", &[("src/a.c", &["/* GPL */"])]);
    let app = create_test_app(&env).await;

    call_json(&app, signed_webhook(&pr_event("opened", 3, "first"))).await;
    drain(&env).await;
    assert!(env.mock.comments()[0].body.contains("Potential license problem(s) detected"));

    add_pull(&env, 3, "second", &[("src/a.c", &["int clean;"])]);
    call_json(&app, signed_webhook(&pr_event("synchronize", 3, "second"))).await;
    drain(&env).await;

    let comments = env.mock.comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].edits, 1);
    assert!(comments[0].body.contains("No license issue detected"));

    let last = env.mock.statuses().pop().unwrap();
    assert_eq!((last.sha.as_str(), last.state.as_str()), ("second", "success"));
}

#[actix_rt::test]
async fn test_repeated_trigger_before_dispatch_is_deduplicated() {
    let env = setup().await;
    add_pull(&env, 5, "newest", &[("src/a.c", &["int a;"])]);
    let app = create_test_app(&env).await;

    let (_, first) = call_json(&app, signed_webhook(&pr_event("opened", 5, "older"))).await;
    let (_, second) =
        call_json(&app, signed_webhook(&pr_event("synchronize", 5, "newest"))).await;
    assert_eq!(second["outcome"], "replaced");
    assert_eq!(first["item_id"], second["item_id"]);
    assert_eq!(env.scheduler.queue().pending_len(), 1);

    let (_, queue) = call_json(&app, test::TestRequest::get().uri("/api/v1/queue")).await;
    assert_eq!(queue["pending"].as_array().unwrap().len(), 1);
    assert_eq!(queue["pending"][0]["head_sha"], "newest");

    drain(&env).await;
    assert_eq!(env.store.outcomes().await.len(), 1);
}

#[actix_rt::test]
async fn test_unmatched_files_are_not_reported() {
    let env = setup().await;
    add_pull(&env, 8, "sha8", &[("src/own.c", &["/* ORIGINAL work */"])]);
    let app = create_test_app(&env).await;

    call_json(&app, signed_webhook(&pr_event("reopened", 8, "sha8"))).await;
    drain(&env).await;

    let outcome = env.store.outcomes().await.pop().unwrap();
    assert!(outcome.result.unwrap().findings.is_empty());
    assert_eq!(env.mock.statuses().pop().unwrap().state, "success");
}

#[actix_rt::test]
async fn test_bad_signature_is_rejected_before_queueing() {
    let env = setup().await;
    let app = create_test_app(&env).await;
    let body = serde_json::to_vec(&pr_event("opened", 1, "abc")).unwrap();

    let req = test::TestRequest::post()
        .uri("/webhooks")
        .insert_header(("X-GitHub-Event", "pull_request"))
        .insert_header(("X-Hub-Signature-256", format!("sha256={}", "0".repeat(64))))
        .set_payload(body.clone());
    let (status, error) = call_json(&app, req).await;
    assert_eq!(status, 403);
    assert_eq!(error["error"], "FORBIDDEN");

    let req = test::TestRequest::post().uri("/webhooks").set_payload(body);
    let (status, _) = call_json(&app, req).await;
    assert_eq!(status, 403);

    assert_eq!(env.scheduler.queue().pending_len(), 0);
    assert!(env.mock.statuses().is_empty());
}

#[actix_rt::test]
async fn test_ping_and_unrelated_actions_are_acknowledged() {
    let env = setup().await;
    let app = create_test_app(&env).await;

    let ping = serde_json::json!({ "zen": "Keep it logically awesome.", "hook_id": 1 });
    let (status, body) = call_json(&app, signed_webhook(&ping)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "pong");

    let (status, body) = call_json(&app, signed_webhook(&pr_event("labeled", 2, "abc"))).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ignored");
    assert_eq!(env.scheduler.queue().pending_len(), 0);
}

#[actix_rt::test]
async fn test_close_drops_undispatched_scan() {
    let env = setup().await;
    let app = create_test_app(&env).await;

    call_json(&app, signed_webhook(&pr_event("opened", 11, "abc"))).await;
    assert_eq!(env.scheduler.queue().pending_len(), 1);

    let (status, body) = call_json(&app, signed_webhook(&pr_event("closed", 11, "abc"))).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "closed");
    assert_eq!(body["removed"], 1);

    drain(&env).await;
    assert!(env.store.outcomes().await.is_empty());
    let (_, queue): (u16, Value) =
        call_json(&app, test::TestRequest::get().uri("/api/v1/queue")).await;
    assert!(queue["pending"].as_array().unwrap().is_empty());
}

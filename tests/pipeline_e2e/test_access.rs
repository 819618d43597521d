//! Repositories the service cannot read.

use super::test_helpers::*;

#[actix_rt::test]
async fn test_unknown_repository_ends_in_no_access_without_comment() {
    let env = setup().await;
    // Nothing registered on the mock: every repository call answers 404.
    let app = create_test_app(&env).await;

    let (status, _) = call_json(&app, signed_webhook(&pr_event("opened", 9, "abc"))).await;
    assert_eq!(status, 202);
    drain(&env).await;

    let outcome = env.store.outcomes().await.pop().unwrap();
    assert_eq!(outcome.status.as_str(), "no_access");
    assert!(env.mock.comments().is_empty());
    // The status post is refused by the same host, so nothing is recorded.
    assert!(env.mock.statuses().is_empty());
}

#[actix_rt::test]
async fn test_repository_without_license_is_treated_as_proprietary() {
    let env = setup().await;
    env.mock.add_pull(
        TEST_REPO,
        None,
        4,
        super::mock_github::MockPull {
            head_ref: "feature-4".to_string(),
            head_sha: "nolicense".to_string(),
            files: vec![("src/a.c".to_string(), added_patch(&["int a;"]))],
        },
    );
    let app = create_test_app(&env).await;

    call_json(&app, signed_webhook(&pr_event("opened", 4, "nolicense"))).await;
    drain(&env).await;

    let result = env.store.outcomes().await.pop().unwrap().result.unwrap();
    assert_eq!(result.repository_license, "Proprietary");
    assert!(env.mock.comments()[0].body.contains("`Proprietary`"));
}

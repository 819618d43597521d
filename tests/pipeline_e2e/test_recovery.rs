//! Startup recovery of persisted queue rows.

use chrono::{Duration as ChronoDuration, Utc};
use lpvs_lib::db::{MemoryStore, ScanStore};
use lpvs_lib::models::{Action, Priority, QueueStatus, RepoRef, ScanStatus, WorkItem};
use lpvs_lib::services::recover_queue;
use std::sync::Arc;
use uuid::Uuid;

use super::test_helpers::*;

fn persisted(number: u64, head_sha: &str, status: QueueStatus, attempts: u32) -> WorkItem {
    let repo_url = format!("https://github.com/{}", TEST_REPO);
    WorkItem {
        id: Uuid::now_v7(),
        repository: RepoRef::parse(TEST_REPO).unwrap(),
        repository_url: repo_url.clone(),
        pull_request: number,
        pull_request_url: Some(format!("{}/pull/{}", repo_url, number)),
        head_ref: format!("feature-{}", number),
        head_sha: head_sha.to_string(),
        base_ref: Some("main".to_string()),
        fork_url: None,
        action: Action::Open,
        sender: Some("octocat".to_string()),
        priority: Priority::Normal,
        status,
        attempts,
        created_at: Utc::now() - ChronoDuration::seconds(60),
    }
}

#[actix_rt::test]
async fn test_interrupted_scan_is_rescanned_after_restart() {
    let store = Arc::new(MemoryStore::new());
    store.seed_catalog(test_catalog()).await;
    store
        .save_queue_item(&persisted(15, "crashed", QueueStatus::Scanning, 0))
        .await
        .unwrap();
    let env = setup_with_store(store).await;
    add_pull(&env, 15, "crashed", &[("src/a.c", &["int a;"])]);

    let report = recover_queue(&env.scheduler, env.config.queue.max_attempts)
        .await
        .unwrap();
    assert_eq!(report.resumed, 1);
    assert_eq!(env.store.list_queue_items().await.unwrap()[0].attempts, 1);

    drain(&env).await;

    let outcomes = env.store.outcomes().await;
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].status, ScanStatus::Completed);
    assert!(env.store.list_queue_items().await.unwrap().is_empty());
}

#[actix_rt::test]
async fn test_scan_interrupted_too_often_is_given_up() {
    let store = Arc::new(MemoryStore::new());
    store.seed_catalog(test_catalog()).await;
    store
        .save_queue_item(&persisted(16, "doomed", QueueStatus::Scanning, 2))
        .await
        .unwrap();
    let env = setup_with_store(store).await;
    add_pull(&env, 16, "doomed", &[("src/a.c", &["int a;"])]);

    let report = recover_queue(&env.scheduler, env.config.queue.max_attempts)
        .await
        .unwrap();
    assert_eq!(report.abandoned, 1);
    assert_eq!(env.scheduler.queue().pending_len(), 0);

    let outcome = env.store.outcomes().await.pop().unwrap();
    assert_eq!(outcome.status, ScanStatus::InternalError);
    let last = env.mock.statuses().pop().unwrap();
    assert_eq!((last.sha.as_str(), last.state.as_str()), ("doomed", "error"));
    assert!(env.mock.comments().is_empty());
}

#[actix_rt::test]
async fn test_started_scheduler_processes_recovered_queue() {
    let store = Arc::new(MemoryStore::new());
    store.seed_catalog(test_catalog()).await;
    store
        .save_queue_item(&persisted(17, "queued", QueueStatus::Pending, 0))
        .await
        .unwrap();
    let env = setup_with_store(store).await;
    add_pull(&env, 17, "queued", &[("src/a.c", &["int a;"])]);

    recover_queue(&env.scheduler, env.config.queue.max_attempts)
        .await
        .unwrap();
    let handle = env.scheduler.clone().start();
    for _ in 0..200 {
        if !env.store.outcomes().await.is_empty() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    handle.shutdown().await;

    assert_eq!(env.store.outcomes().await.len(), 1);
    assert!(env.store.list_queue_items().await.unwrap().is_empty());
}

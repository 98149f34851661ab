//! Resumability and idempotence of repeated runs.

use super::support::{comment, issue, issue_page, test_config, FailKind, ScriptedClient};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use ticket_data_exporter::cursor::CursorStore;
use ticket_data_exporter::engine::SyncExecutor;
use ticket_data_exporter::fetcher::SourceClient;
use ticket_data_exporter::store::RawStore;
use ticket_data_exporter::{Collection, RunOutcome};

fn three_pages() -> Vec<Vec<ticket_data_exporter::Record>> {
    vec![issue_page(0, 50), issue_page(50, 50), issue_page(100, 50)]
}

#[tokio::test]
async fn test_resume_fetches_only_remaining_pages() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues]);

    // First run dies at page 1.
    let failing = ScriptedClient::new(three_pages()).with_hard_failure(1, FailKind::Network);
    let summary = SyncExecutor::with_client(config.clone(), Arc::new(failing))
        .run()
        .await;
    assert_eq!(summary.collections[0].outcome, RunOutcome::Partial);

    // Second run resumes from the checkpoint and never re-requests page 0.
    let healthy = Arc::new(ScriptedClient::new(three_pages()));
    let summary = SyncExecutor::with_client(
        config.clone(),
        Arc::clone(&healthy) as Arc<dyn SourceClient>,
    )
        .run()
        .await;
    assert!(summary.all_success());
    assert_eq!(healthy.issue_calls(), 2);

    let store = RawStore::new(config.raw_dir);
    assert_eq!(store.count(Collection::Issues).unwrap(), 150);
    assert!(CursorStore::new(config.state_dir)
        .load(Collection::Issues)
        .unwrap()
        .is_complete());
}

#[tokio::test]
async fn test_rerun_after_completion_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues]);

    SyncExecutor::with_client(config.clone(), Arc::new(ScriptedClient::new(three_pages())))
        .run()
        .await;
    let summary =
        SyncExecutor::with_client(config.clone(), Arc::new(ScriptedClient::new(three_pages())))
            .run()
            .await;

    assert!(summary.all_success());
    assert_eq!(summary.collections[0].inserted, 0);
    assert_eq!(summary.collections[0].skipped, 150);
    assert_eq!(
        RawStore::new(config.raw_dir).count(Collection::Issues).unwrap(),
        150
    );
}

#[tokio::test]
async fn test_updated_records_supersede_on_rerun() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues]);

    SyncExecutor::with_client(
        config.clone(),
        Arc::new(ScriptedClient::new(vec![vec![issue(
            "iss-1",
            "2026-01-10T00:00:00Z",
        )]])),
    )
    .run()
    .await;

    let summary = SyncExecutor::with_client(
        config.clone(),
        Arc::new(ScriptedClient::new(vec![vec![issue(
            "iss-1",
            "2026-02-01T00:00:00Z",
        )]])),
    )
    .run()
    .await;

    assert_eq!(summary.collections[0].superseded, 1);
    let store = RawStore::new(config.raw_dir.clone());
    let current = store.get(Collection::Issues, "iss-1").unwrap().unwrap();
    assert_eq!(
        current.payload["updated_at"].as_str(),
        Some("2026-02-01T00:00:00Z")
    );

    // Both revisions stay on disk as an audit trail.
    let file = config.raw_dir.join("issues").join("iss-1.jsonl");
    assert_eq!(std::fs::read_to_string(file).unwrap().lines().count(), 2);
}

#[tokio::test]
async fn test_corrupt_checkpoint_falls_back_to_full_refetch() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues]);

    SyncExecutor::with_client(config.clone(), Arc::new(ScriptedClient::new(three_pages())))
        .run()
        .await;

    std::fs::write(
        config.state_dir.join("issues.checkpoint.json"),
        "{ not json",
    )
    .unwrap();

    let client = Arc::new(ScriptedClient::new(three_pages()));
    let summary = SyncExecutor::with_client(
        config.clone(),
        Arc::clone(&client) as Arc<dyn SourceClient>,
    )
        .run()
        .await;

    // All pages re-fetched; the idempotent store absorbs the duplicates.
    assert!(summary.all_success());
    assert_eq!(client.issue_calls(), 3);
    assert_eq!(summary.collections[0].skipped, 150);
    assert_eq!(
        RawStore::new(config.raw_dir).count(Collection::Issues).unwrap(),
        150
    );
}

#[tokio::test]
async fn test_comment_threads_survive_resume() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues, Collection::Comments]);

    let mut threads = HashMap::new();
    threads.insert(
        "iss-0".to_string(),
        vec![comment("c-0", "iss-0", "2026-01-11T00:00:00Z")],
    );
    threads.insert(
        "iss-50".to_string(),
        vec![comment("c-50", "iss-50", "2026-01-12T00:00:00Z")],
    );

    // First run stops after page 0 (its comments are already drained).
    let failing = ScriptedClient::new(vec![issue_page(0, 50), issue_page(50, 50)])
        .with_hard_failure(1, FailKind::Network)
        .with_comments(threads.clone());
    SyncExecutor::with_client(config.clone(), Arc::new(failing))
        .run()
        .await;

    let store = RawStore::new(config.raw_dir.clone());
    assert!(store.get(Collection::Comments, "c-0").unwrap().is_some());
    assert!(store.get(Collection::Comments, "c-50").unwrap().is_none());

    // Resume completes the remaining page and its thread.
    let healthy = ScriptedClient::new(vec![issue_page(0, 50), issue_page(50, 50)])
        .with_comments(threads);
    let summary = SyncExecutor::with_client(config.clone(), Arc::new(healthy))
        .run()
        .await;
    assert!(summary.all_success());
    assert!(store.get(Collection::Comments, "c-50").unwrap().is_some());
}

//! Retry and failure-classification behavior of the fetch engine.

use super::support::{issue_page, test_config, FailKind, ScriptedClient};
use std::sync::Arc;
use tempfile::TempDir;
use ticket_data_exporter::cursor::CursorStore;
use ticket_data_exporter::engine::SyncExecutor;
use ticket_data_exporter::store::RawStore;
use ticket_data_exporter::{Collection, RunOutcome};

#[tokio::test]
async fn test_three_pages_with_two_transient_failures_completes() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues]);
    let client = ScriptedClient::new(vec![
        issue_page(0, 50),
        issue_page(50, 50),
        issue_page(100, 50),
    ])
    .with_transient_failures(1, 2);

    let executor = SyncExecutor::with_client(config.clone(), Arc::new(client));
    let summary = executor.run().await;

    assert!(summary.all_success());
    assert_eq!(summary.collections[0].pages, 3);
    assert_eq!(summary.collections[0].fetched, 150);
    assert_eq!(summary.collections[0].inserted, 150);
    assert_eq!(summary.transport_retries, 2);

    // Every record persisted exactly once, checkpoint at the end.
    let store = RawStore::new(config.raw_dir);
    assert_eq!(store.count(Collection::Issues).unwrap(), 150);
    let checkpoint = CursorStore::new(config.state_dir)
        .load(Collection::Issues)
        .unwrap();
    assert!(checkpoint.is_complete());
    assert_eq!(checkpoint.last_page_index(), 3);
}

#[tokio::test]
async fn test_persistent_network_failure_is_partial_with_valid_checkpoint() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues]);
    let client = ScriptedClient::new(vec![issue_page(0, 50), issue_page(50, 50)])
        .with_hard_failure(1, FailKind::Network);

    let executor = SyncExecutor::with_client(config.clone(), Arc::new(client));
    let summary = executor.run().await;

    assert_eq!(summary.collections[0].outcome, RunOutcome::Partial);
    // Page 0 made it to disk and the checkpoint points at page 1.
    assert_eq!(
        RawStore::new(config.raw_dir).count(Collection::Issues).unwrap(),
        50
    );
    let checkpoint = CursorStore::new(config.state_dir)
        .load(Collection::Issues)
        .unwrap();
    assert_eq!(checkpoint.cursor_token(), Some("page-1"));
    assert!(!checkpoint.is_complete());
}

#[tokio::test]
async fn test_rate_limit_exhaustion_is_partial_not_failed() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues]);
    let client = ScriptedClient::new(vec![issue_page(0, 10)])
        .with_hard_failure(0, FailKind::RateLimit);

    let executor = SyncExecutor::with_client(config, Arc::new(client));
    let summary = executor.run().await;

    assert_eq!(summary.collections[0].outcome, RunOutcome::Partial);
    assert_eq!(summary.exit_code(), 1);
}

#[tokio::test]
async fn test_rejection_is_failed_and_checkpoint_untouched() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues]);
    let client = ScriptedClient::new(vec![issue_page(0, 10), issue_page(10, 10)])
        .with_hard_failure(1, FailKind::Rejected);

    let executor = SyncExecutor::with_client(config.clone(), Arc::new(client));
    let summary = executor.run().await;

    assert_eq!(summary.collections[0].outcome, RunOutcome::Failed);
    // The checkpoint still describes the last good page.
    let checkpoint = CursorStore::new(config.state_dir)
        .load(Collection::Issues)
        .unwrap();
    assert_eq!(checkpoint.cursor_token(), Some("page-1"));
    assert_eq!(checkpoint.last_page_index(), 1);
}

//! End-to-end sync plus transform: raw store in, Kapa.ai payload out.

use super::support::{comment, issue, test_config, ScriptedClient};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use ticket_data_exporter::engine::SyncExecutor;
use ticket_data_exporter::store::RawStore;
use ticket_data_exporter::transform::TransformPipeline;
use ticket_data_exporter::{Collection, Platform};

#[tokio::test]
async fn test_sync_then_transform_produces_documents_and_index() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues, Collection::Comments]);

    let mut threads = HashMap::new();
    threads.insert(
        "iss-7".to_string(),
        vec![
            comment("c-1", "iss-7", "2026-01-11T00:00:00Z"),
            comment("c-2", "iss-7", "2026-01-12T00:00:00Z"),
        ],
    );
    let client = ScriptedClient::new(vec![vec![issue("iss-7", "2026-01-10T00:00:00Z")]])
        .with_comments(threads);
    let summary = SyncExecutor::with_client(config.clone(), Arc::new(client))
        .run()
        .await;
    assert!(summary.all_success());

    let store = RawStore::new(config.raw_dir);
    let report = TransformPipeline::new(Platform::Pylon, &config.out_dir)
        .run(&store)
        .unwrap();
    assert_eq!(report.documents, 1);

    let index: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.out_dir.join("index.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(index["source"], "pylon_support_tickets");
    assert_eq!(index["total_documents"], 1);

    let file_path = index["documents"][0]["file_path"].as_str().unwrap();
    let body = std::fs::read_to_string(config.out_dir.join(file_path)).unwrap();
    assert!(body.starts_with("# Pylon Issue:"));
    assert!(body.contains("## Conversation"));
    // HTML message bodies are converted to markdown.
    assert!(!body.contains("<p>"));
    assert!(body.contains("Looking into it"));
}

#[tokio::test]
async fn test_transform_reflects_only_latest_revision() {
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

    // A newer revision with a changed title supersedes the first.
    let updated = ticket_data_exporter::Record::from_payload(serde_json::json!({
        "id": "iss-1",
        "number": 1,
        "title": "Renamed issue",
        "state": "closed",
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-02-01T00:00:00Z",
        "body_html": "<p>New body</p>",
    }))
    .unwrap();
    SyncExecutor::with_client(
        config.clone(),
        Arc::new(ScriptedClient::new(vec![vec![updated]])),
    )
    .run()
    .await;

    let store = RawStore::new(config.raw_dir);
    let report = TransformPipeline::new(Platform::Pylon, &config.out_dir)
        .run(&store)
        .unwrap();
    assert_eq!(report.documents, 1);

    let index: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.out_dir.join("index.json")).unwrap(),
    )
    .unwrap();
    let file_path = index["documents"][0]["file_path"].as_str().unwrap();
    assert!(file_path.contains("Renamed_issue"));
    let body = std::fs::read_to_string(config.out_dir.join(file_path)).unwrap();
    assert!(body.contains("Renamed issue"));
    assert!(body.contains("New body"));
}

#[tokio::test]
async fn test_transform_tolerates_partial_comment_collection() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path(), vec![Collection::Issues]);

    // Issues only; no comments were ever fetched.
    SyncExecutor::with_client(
        config.clone(),
        Arc::new(ScriptedClient::new(vec![vec![issue(
            "iss-1",
            "2026-01-10T00:00:00Z",
        )]])),
    )
    .run()
    .await;

    let store = RawStore::new(config.raw_dir);
    let report = TransformPipeline::new(Platform::Pylon, &config.out_dir)
        .run(&store)
        .unwrap();
    assert_eq!(report.documents, 1);

    let index: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(config.out_dir.join("index.json")).unwrap(),
    )
    .unwrap();
    let file_path = index["documents"][0]["file_path"].as_str().unwrap();
    let body = std::fs::read_to_string(config.out_dir.join(file_path)).unwrap();
    assert!(!body.contains("## Conversation"));
}

//! Durability and failure semantics of the checkpoint store.

use tempfile::TempDir;
use ticket_data_exporter::cursor::{Checkpoint, CursorStore};
use ticket_data_exporter::Collection;

#[test]
fn test_checkpoint_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = CursorStore::new(dir.path());

    let saved = Checkpoint::after_page(Some("page-3".to_string()), None, 3);
    store.save(Collection::Issues, &saved).unwrap();

    let loaded = store.load(Collection::Issues).unwrap();
    assert_eq!(loaded.cursor_token(), Some("page-3"));
    assert_eq!(loaded.last_page_index(), 3);
    assert!(!loaded.is_complete());
}

#[test]
fn test_checkpoint_file_carries_schema_version() {
    let dir = TempDir::new().unwrap();
    let store = CursorStore::new(dir.path());
    store
        .save(Collection::Issues, &Checkpoint::after_page(None, None, 1))
        .unwrap();

    let raw = std::fs::read_to_string(dir.path().join("issues.checkpoint.json")).unwrap();
    assert!(raw.contains("schema_version"));
    assert!(raw.contains("1.0.0"));
}

#[test]
fn test_unknown_schema_version_treated_as_absent() {
    let dir = TempDir::new().unwrap();
    let store = CursorStore::new(dir.path());
    store
        .save(Collection::Issues, &Checkpoint::after_page(None, None, 1))
        .unwrap();

    let path = dir.path().join("issues.checkpoint.json");
    let raw = std::fs::read_to_string(&path)
        .unwrap()
        .replace("1.0.0", "9.9.9");
    std::fs::write(&path, raw).unwrap();

    assert!(store.load(Collection::Issues).is_none());
}

#[test]
fn test_corrupt_checkpoint_treated_as_absent() {
    let dir = TempDir::new().unwrap();
    let store = CursorStore::new(dir.path());
    std::fs::write(dir.path().join("issues.checkpoint.json"), "garbage").unwrap();

    assert!(store.load(Collection::Issues).is_none());
}

#[test]
fn test_save_leaves_no_temp_files_behind() {
    let dir = TempDir::new().unwrap();
    let store = CursorStore::new(dir.path());
    for page in 1..=5 {
        store
            .save(
                Collection::Issues,
                &Checkpoint::after_page(Some(format!("page-{page}")), None, page),
            )
            .unwrap();
    }

    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    for name in &names {
        assert!(
            name.ends_with(".checkpoint.json") || name.ends_with(".lock"),
            "unexpected file in state dir: {name}"
        );
    }
}

#[test]
fn test_reset_removes_only_the_named_collection() {
    let dir = TempDir::new().unwrap();
    let store = CursorStore::new(dir.path());
    store
        .save(Collection::Issues, &Checkpoint::after_page(None, None, 1))
        .unwrap();
    store
        .save(Collection::Comments, &Checkpoint::after_page(None, None, 1))
        .unwrap();

    store.reset(Collection::Issues).unwrap();
    assert!(store.load(Collection::Issues).is_none());
    assert!(store.load(Collection::Comments).is_some());
}

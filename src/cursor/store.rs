//! Checkpoint persistence with atomic writes and file locking

use super::checkpoint::Checkpoint;
use crate::Collection;
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current checkpoint file schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// On-disk envelope around a checkpoint
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    schema_version: String,
    collection: String,
    checkpoint: Checkpoint,
}

/// Errors related to checkpoint persistence
#[derive(Debug, thiserror::Error)]
pub enum CursorError {
    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Lock error
    #[error("lock error: {0}")]
    Lock(String),
}

/// Durable store of pagination progress, one checkpoint file per
/// collection.
///
/// Saving is atomic (write-temp-then-rename) and guarded by an `fd-lock`
/// lock file, so a concurrent or subsequent reader never observes a
/// half-written checkpoint. A corrupt or unreadable file is treated as
/// absent (the collection re-fetches from the start) and logged as a
/// warning, never surfaced as fatal.
pub struct CursorStore {
    state_dir: PathBuf,
}

impl CursorStore {
    /// Create a store rooted at `state_dir` (created on first save).
    pub fn new<P: Into<PathBuf>>(state_dir: P) -> Self {
        Self {
            state_dir: state_dir.into(),
        }
    }

    fn checkpoint_path(&self, collection: Collection) -> PathBuf {
        self.state_dir
            .join(format!("{}.checkpoint.json", collection.name()))
    }

    fn open_lock_file(path: &Path) -> Result<std::fs::File, CursorError> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path.with_extension("lock"))
            .map_err(|e| CursorError::Lock(format!("failed to create lock file: {e}")))
    }

    /// Load the checkpoint for a collection, if one exists and is readable.
    pub fn load(&self, collection: Collection) -> Option<Checkpoint> {
        let path = self.checkpoint_path(collection);
        if !path.exists() {
            debug!(collection = %collection, "No checkpoint found, starting fresh");
            return None;
        }

        let lock_file = match Self::open_lock_file(&path) {
            Ok(f) => f,
            Err(e) => {
                warn!(collection = %collection, error = %e, "Checkpoint lock failed, treating as absent");
                return None;
            }
        };
        let lock = RwLock::new(lock_file);
        let _guard = match lock.read() {
            Ok(g) => g,
            Err(e) => {
                warn!(collection = %collection, error = %e, "Checkpoint lock failed, treating as absent");
                return None;
            }
        };

        let contents = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => {
                warn!(collection = %collection, error = %e, "Checkpoint unreadable, treating as absent");
                return None;
            }
        };

        let file: CheckpointFile = match serde_json::from_str(&contents) {
            Ok(f) => f,
            Err(e) => {
                warn!(collection = %collection, error = %e, "Checkpoint corrupt, treating as absent");
                return None;
            }
        };

        if file.schema_version != SCHEMA_VERSION {
            warn!(
                collection = %collection,
                found_version = %file.schema_version,
                expected_version = SCHEMA_VERSION,
                "Checkpoint schema version mismatch, treating as absent"
            );
            return None;
        }

        info!(
            collection = %collection,
            last_page_index = file.checkpoint.last_page_index(),
            cursor = ?file.checkpoint.cursor_token(),
            "Checkpoint loaded"
        );
        Some(file.checkpoint)
    }

    /// Save a checkpoint atomically.
    pub fn save(&self, collection: Collection, checkpoint: &Checkpoint) -> Result<(), CursorError> {
        let path = self.checkpoint_path(collection);
        std::fs::create_dir_all(&self.state_dir).map_err(|e| CursorError::Io(e.to_string()))?;

        let file = CheckpointFile {
            schema_version: SCHEMA_VERSION.to_string(),
            collection: collection.name().to_string(),
            checkpoint: checkpoint.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| CursorError::Serialization(e.to_string()))?;

        let lock_file = Self::open_lock_file(&path)?;
        let mut lock = RwLock::new(lock_file);
        let _guard = lock
            .write()
            .map_err(|e| CursorError::Lock(format!("failed to acquire write lock: {e}")))?;

        let mut temp_file = tempfile::NamedTempFile::new_in(&self.state_dir)
            .map_err(|e| CursorError::Io(format!("failed to create temp file: {e}")))?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(|e| CursorError::Io(format!("failed to write temp file: {e}")))?;
        temp_file
            .flush()
            .map_err(|e| CursorError::Io(format!("failed to flush temp file: {e}")))?;
        temp_file
            .as_file()
            .sync_all()
            .map_err(|e| CursorError::Io(format!("failed to sync temp file: {e}")))?;
        temp_file
            .persist(&path)
            .map_err(|e| CursorError::Io(format!("failed to persist temp file: {e}")))?;

        // Fsync the directory so the rename survives a crash.
        if let Ok(dir) = std::fs::File::open(&self.state_dir) {
            let _ = dir.sync_all();
        }

        debug!(
            collection = %collection,
            last_page_index = checkpoint.last_page_index(),
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Remove a collection's checkpoint, forcing a full re-fetch next run.
    pub fn reset(&self, collection: Collection) -> Result<(), CursorError> {
        let path = self.checkpoint_path(collection);
        if path.exists() {
            std::fs::remove_file(&path).map_err(|e| CursorError::Io(e.to_string()))?;
            info!(collection = %collection, "Checkpoint reset");
        }
        let lock_path = path.with_extension("lock");
        if lock_path.exists() {
            let _ = std::fs::remove_file(&lock_path);
        }
        Ok(())
    }
}

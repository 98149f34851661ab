//! Raw store implementation
//!
//! Layout: `<raw_dir>/<collection>/<sanitized_id>.jsonl`, one line per
//! fetched revision. The last valid line with the highest revision is the
//! "current" view; prior lines form the audit trail.

use super::{StoreError, StoreResult};
use crate::{Collection, Record, Revision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A record as persisted on disk, with fetch metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    /// Stable external ID
    pub external_id: String,
    /// Revision marker of the payload
    pub revision: Revision,
    /// When this revision was fetched
    pub fetched_at: DateTime<Utc>,
    /// Full fetched payload
    pub payload: serde_json::Value,
}

/// Disposition of an append attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// First revision of this ID
    Inserted,
    /// Newer revision appended over an existing entry
    Superseded,
    /// Same or older revision; nothing written
    Skipped,
}

/// Append-only, revision-keyed record store.
pub struct RawStore {
    raw_dir: PathBuf,
}

impl RawStore {
    /// Create a store rooted at `raw_dir` (created lazily on first write).
    pub fn new<P: Into<PathBuf>>(raw_dir: P) -> Self {
        Self {
            raw_dir: raw_dir.into(),
        }
    }

    fn collection_dir(&self, collection: Collection) -> PathBuf {
        self.raw_dir.join(collection.name())
    }

    fn record_path(&self, collection: Collection, external_id: &str) -> PathBuf {
        self.collection_dir(collection)
            .join(format!("{}.jsonl", sanitize_id(external_id)))
    }

    /// Append a record unless the stored revision is already current.
    ///
    /// Idempotent: re-appending the same revision is a no-op, an older
    /// revision is a no-op, a newer revision appends and supersedes.
    pub fn append(&self, collection: Collection, record: &Record) -> StoreResult<WriteOutcome> {
        let path = self.record_path(collection, &record.external_id);

        let existing = if path.exists() {
            read_latest(&path)?
        } else {
            None
        };

        if let Some(latest) = &existing {
            if record.revision <= latest.revision {
                debug!(
                    collection = %collection,
                    external_id = %record.external_id,
                    revision = %record.revision,
                    "Revision already current, skipping"
                );
                return Ok(WriteOutcome::Skipped);
            }
        }

        let stored = StoredRecord {
            external_id: record.external_id.clone(),
            revision: record.revision,
            fetched_at: Utc::now(),
            payload: record.payload.clone(),
        };
        let mut line = serde_json::to_string(&stored)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        line.push('\n');

        std::fs::create_dir_all(self.collection_dir(collection))
            .map_err(|e| StoreError::Io(e.to_string()))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .map_err(|e| StoreError::Io(e.to_string()))?;
        // Sync so the following checkpoint never claims records the disk
        // does not have.
        file.sync_all().map_err(|e| StoreError::Io(e.to_string()))?;

        Ok(if existing.is_some() {
            WriteOutcome::Superseded
        } else {
            WriteOutcome::Inserted
        })
    }

    /// Append a whole page of records, returning per-disposition counts
    /// (inserted, superseded, skipped).
    pub fn append_page(
        &self,
        collection: Collection,
        records: &[Record],
    ) -> StoreResult<(u64, u64, u64)> {
        let mut inserted = 0;
        let mut superseded = 0;
        let mut skipped = 0;
        for record in records {
            match self.append(collection, record)? {
                WriteOutcome::Inserted => inserted += 1,
                WriteOutcome::Superseded => superseded += 1,
                WriteOutcome::Skipped => skipped += 1,
            }
        }
        Ok((inserted, superseded, skipped))
    }

    /// The current (highest-revision) entry for every ID in a collection.
    ///
    /// Tolerates a trailing partial line left by a crash mid-append; that
    /// line is ignored with a warning and the previous revision wins.
    pub fn current(&self, collection: Collection) -> StoreResult<Vec<StoredRecord>> {
        let dir = self.collection_dir(collection);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::Io(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(latest) = read_latest(&path)? {
                records.push(latest);
            }
        }

        records.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        Ok(records)
    }

    /// The current entry for one ID, if present.
    pub fn get(
        &self,
        collection: Collection,
        external_id: &str,
    ) -> StoreResult<Option<StoredRecord>> {
        let path = self.record_path(collection, external_id);
        if !path.exists() {
            return Ok(None);
        }
        read_latest(&path)
    }

    /// Number of distinct IDs currently stored in a collection.
    pub fn count(&self, collection: Collection) -> StoreResult<usize> {
        let dir = self.collection_dir(collection);
        if !dir.exists() {
            return Ok(0);
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::Io(e.to_string()))?;
        let mut count = 0;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Io(e.to_string()))?;
            if entry.path().extension().and_then(|e| e.to_str()) == Some("jsonl") {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Read the highest-revision valid line of a record file.
fn read_latest(path: &Path) -> StoreResult<Option<StoredRecord>> {
    let contents = std::fs::read_to_string(path).map_err(|e| StoreError::Io(e.to_string()))?;

    let mut latest: Option<StoredRecord> = None;
    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredRecord>(line) {
            Ok(record) => {
                let newer = latest
                    .as_ref()
                    .map(|l| record.revision > l.revision)
                    .unwrap_or(true);
                if newer {
                    latest = Some(record);
                }
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Unparseable audit line, ignoring"
                );
            }
        }
    }
    Ok(latest)
}

/// Make an external ID filesystem-safe.
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

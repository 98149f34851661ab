//! Fetch run bookkeeping and outcome classification

use crate::{Collection, RunOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-collection result of one fetch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSummary {
    /// Which collection this summarizes
    pub collection: Collection,
    /// Final outcome
    pub outcome: RunOutcome,
    /// Pages fully processed (fetched, persisted, checkpointed)
    pub pages: u64,
    /// Records received from the remote
    pub fetched: u64,
    /// New IDs written
    pub inserted: u64,
    /// Existing IDs updated to a newer revision
    pub superseded: u64,
    /// Records skipped as already current
    pub skipped: u64,
    /// Why the run stopped, for partial/failed outcomes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl CollectionSummary {
    /// An empty summary in the running state.
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            outcome: RunOutcome::Success,
            pages: 0,
            fetched: 0,
            inserted: 0,
            superseded: 0,
            skipped: 0,
            note: None,
        }
    }

    /// Fold store write dispositions for one page into the counts.
    pub fn record_page(&mut self, fetched: u64, inserted: u64, superseded: u64, skipped: u64) {
        self.pages += 1;
        self.fetched += fetched;
        self.inserted += inserted;
        self.superseded += superseded;
        self.skipped += skipped;
    }

    /// Mark the collection stopped early with a valid checkpoint.
    pub fn mark_partial(&mut self, note: impl Into<String>) {
        self.outcome = RunOutcome::Partial;
        self.note = Some(note.into());
    }

    /// Mark the collection fatally failed.
    pub fn mark_failed(&mut self, note: impl Into<String>) {
        self.outcome = RunOutcome::Failed;
        self.note = Some(note.into());
    }
}

/// Result of one engine invocation across all enabled collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Per-collection results
    pub collections: Vec<CollectionSummary>,
    /// Retries absorbed by the transport over the whole run
    pub transport_retries: u64,
}

impl RunSummary {
    /// Whether every collection finished successfully.
    pub fn all_success(&self) -> bool {
        self.collections
            .iter()
            .all(|c| c.outcome == RunOutcome::Success)
    }

    /// Process exit code: zero only when every collection succeeded.
    pub fn exit_code(&self) -> i32 {
        if self.all_success() {
            0
        } else {
            1
        }
    }

    /// Render the per-collection summary table shown at the end of a run.
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "{:<10} {:>8} {:>8} {:>9} {:>10} {:>8}  {}\n",
            "collection", "pages", "fetched", "inserted", "superseded", "skipped", "outcome"
        ));
        for c in &self.collections {
            let note = c
                .note
                .as_deref()
                .map(|n| format!(" ({n})"))
                .unwrap_or_default();
            out.push_str(&format!(
                "{:<10} {:>8} {:>8} {:>9} {:>10} {:>8}  {}{}\n",
                c.collection.name(),
                c.pages,
                c.fetched,
                c.inserted,
                c.superseded,
                c.skipped,
                c.outcome,
                note
            ));
        }
        out.push_str(&format!(
            "elapsed: {}s, transport retries: {}\n",
            (self.finished_at - self.started_at).num_seconds(),
            self.transport_retries
        ));
        out
    }
}

//! Transform pipeline: raw store to Kapa.ai markdown + index.
//!
//! Reads only the current (highest-revision) view of the raw store, renders
//! one markdown document per issue with its comment thread inlined, and
//! emits an `index.json` describing the documents. The output directory is
//! the S3 upload unit; uploading itself is out of scope.

use crate::store::{RawStore, StoreError, StoredRecord};
use crate::{Collection, Platform};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info, warn};

pub mod index;
pub mod markdown;

pub use index::{DocumentIndex, IndexEntry};
pub use markdown::Document;

/// Transform pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Output file could not be written
    #[error("output write failure: {0}")]
    Io(String),

    /// Index serialization failed
    #[error("index serialization failure: {0}")]
    Serialization(String),

    /// The raw store could not be read
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a transform run produced.
#[derive(Debug, Clone)]
pub struct TransformReport {
    /// Markdown documents written
    pub documents: u64,
    /// Issues skipped because they could not be rendered
    pub skipped: u64,
}

/// Renders the raw store into a Kapa.ai output directory.
pub struct TransformPipeline {
    platform: Platform,
    out_dir: PathBuf,
}

impl TransformPipeline {
    /// Pipeline writing to `out_dir` for a given platform's payload shapes.
    pub fn new(platform: Platform, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            out_dir: out_dir.into(),
        }
    }

    /// Render every stored issue and write the document index.
    ///
    /// Partial collections are fine: an issue with no stored comments gets
    /// a document without a conversation section, and a comment without a
    /// stored parent issue is dropped with a warning.
    pub fn run(&self, store: &RawStore) -> Result<TransformReport, TransformError> {
        let issues = store.current(Collection::Issues)?;
        let comments = group_comments(store.current(Collection::Comments)?);

        std::fs::create_dir_all(&self.out_dir).map_err(|e| TransformError::Io(e.to_string()))?;

        info!(
            platform = %self.platform,
            issues = issues.len(),
            "Rendering markdown documents"
        );

        let mut entries = Vec::new();
        let mut skipped = 0u64;
        for issue in &issues {
            let thread = comments
                .get(&issue.external_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let doc = match markdown::render_issue(self.platform, issue, thread) {
                Some(doc) => doc,
                None => {
                    warn!(
                        external_id = %issue.external_id,
                        "Issue payload missing required fields, skipping"
                    );
                    skipped += 1;
                    continue;
                }
            };

            let path = self.out_dir.join(&doc.file_name);
            std::fs::write(&path, &doc.body).map_err(|e| TransformError::Io(e.to_string()))?;
            debug!(file = %doc.file_name, "Wrote document");

            entries.push(IndexEntry {
                file_path: doc.file_name,
                title: doc.title,
                url: doc.url,
                metadata: doc.metadata,
            });
        }

        let index = DocumentIndex::new(self.platform, entries);
        index.write(&self.out_dir)?;

        let report = TransformReport {
            documents: index.total_documents,
            skipped,
        };
        info!(
            documents = report.documents,
            skipped = report.skipped,
            out_dir = %self.out_dir.display(),
            "Transform complete"
        );
        Ok(report)
    }
}

/// Group stored comments by the `issue_id` injected at fetch time, ordered
/// by revision within each thread.
fn group_comments(comments: Vec<StoredRecord>) -> HashMap<String, Vec<StoredRecord>> {
    let mut grouped: HashMap<String, Vec<StoredRecord>> = HashMap::new();
    for comment in comments {
        match comment.payload.get("issue_id").and_then(|v| v.as_str()) {
            Some(issue_id) => grouped.entry(issue_id.to_string()).or_default().push(comment),
            None => {
                warn!(
                    external_id = %comment.external_id,
                    "Comment has no issue_id, dropping from output"
                );
            }
        }
    }
    for thread in grouped.values_mut() {
        thread.sort_by(|a, b| {
            a.revision
                .cmp(&b.revision)
                .then_with(|| a.external_id.cmp(&b.external_id))
        });
    }
    grouped
}

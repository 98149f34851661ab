//! Checkpoint type for resumable pagination

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable record of fetch progress for one collection.
///
/// Written only after the corresponding page has been persisted to the raw
/// store, never before. The cursor token is opaque; the watermark is the
/// highest revision seen so far and is advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    cursor_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    watermark: Option<DateTime<Utc>>,
    last_page_index: u64,
    updated_at: i64,
}

impl Checkpoint {
    /// Checkpoint for a traversal that has not produced a page yet.
    pub fn start() -> Self {
        Self {
            cursor_token: None,
            watermark: None,
            last_page_index: 0,
            updated_at: Utc::now().timestamp_millis(),
        }
    }

    /// Checkpoint after persisting a page.
    ///
    /// `cursor_token == None` marks the end of the collection.
    pub fn after_page(
        cursor_token: Option<String>,
        watermark: Option<DateTime<Utc>>,
        page_index: u64,
    ) -> Self {
        Self {
            cursor_token,
            watermark,
            last_page_index: page_index,
            updated_at: Utc::now().timestamp_millis(),
        }
    }

    /// The opaque resumption token, if the traversal is unfinished.
    pub fn cursor_token(&self) -> Option<&str> {
        self.cursor_token.as_deref()
    }

    /// Highest revision timestamp seen so far.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }

    /// Index of the last successfully persisted page.
    pub fn last_page_index(&self) -> u64 {
        self.last_page_index
    }

    /// When this checkpoint was written (Unix millis).
    pub fn updated_at(&self) -> i64 {
        self.updated_at
    }

    /// Whether the traversal reached the end of the collection.
    pub fn is_complete(&self) -> bool {
        self.cursor_token.is_none() && self.last_page_index > 0
    }

    /// Fold a newer watermark candidate into this checkpoint's value.
    pub fn max_watermark(
        current: Option<DateTime<Utc>>,
        candidate: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        match (current, candidate) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

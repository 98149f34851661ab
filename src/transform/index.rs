//! `index.json` output for Kapa.ai ingestion.

use super::TransformError;
use crate::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// One document entry in the index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Path of the markdown file relative to the output directory
    pub file_path: String,
    /// Document title
    pub title: String,
    /// Link back to the source platform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Free-form document metadata
    pub metadata: Value,
}

/// The `index.json` envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIndex {
    /// Index schema version
    pub version: String,
    /// When the index was generated
    pub generated_at: DateTime<Utc>,
    /// Source label, stable per platform
    pub source: String,
    /// Number of documents listed
    pub total_documents: u64,
    /// Per-document entries
    pub documents: Vec<IndexEntry>,
}

impl DocumentIndex {
    /// Build an index over the given entries.
    pub fn new(platform: Platform, documents: Vec<IndexEntry>) -> Self {
        let source = match platform {
            Platform::Pylon => "pylon_support_tickets",
            Platform::Linear => "linear_issues",
        };
        Self {
            version: "1.0".to_string(),
            generated_at: Utc::now(),
            source: source.to_string(),
            total_documents: documents.len() as u64,
            documents,
        }
    }

    /// Write `index.json` into the output directory.
    pub fn write(&self, out_dir: &Path) -> Result<(), TransformError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TransformError::Serialization(e.to_string()))?;
        std::fs::write(out_dir.join("index.json"), json)
            .map_err(|e| TransformError::Io(e.to_string()))
    }
}

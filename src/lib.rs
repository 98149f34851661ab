//! # Ticket Data Exporter Library
//!
//! A library for mirroring issue-tracking data (Pylon or Linear) into an
//! auditable local raw store and converting it into a Kapa.ai-compatible
//! knowledge-base payload.
//!
//! ## Features
//!
//! - **Multi-Platform Support**: Pylon (REST) and Linear (GraphQL) sources
//! - **Incremental Fetch**: Cursor-based pagination with durable checkpoints
//! - **Resume Capability**: Interrupted runs resume from the last persisted page
//! - **Rate Limiting**: Built-in fixed-window limiting with exponential backoff
//! - **Auditable Storage**: Append-only, revision-keyed raw record store
//! - **Kapa Output**: Markdown documents plus `index.json` ready for S3 upload
//!
//! ## Quick Start
//!
//! ```no_run
//! use ticket_data_exporter::config::ExporterConfig;
//! use ticket_data_exporter::engine::SyncExecutor;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExporterConfig::from_env()?;
//! let executor = SyncExecutor::new(config)?;
//! let summary = executor.run().await;
//! println!("{}", summary.render_table());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several core modules:
//!
//! - [`config`] - Run configuration loaded once at process start
//! - [`fetcher`] - Platform clients, HTTP transport, pagination
//! - [`engine`] - Incremental fetch orchestration with retry and rate limiting
//! - [`cursor`] - Durable pagination checkpoints
//! - [`store`] - Append-only raw record store
//! - [`transform`] - Raw store to Kapa.ai markdown/index conversion
//! - [`cli`] - Command implementations

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Run configuration
pub mod config;

/// Durable pagination checkpoints
pub mod cursor;

/// Incremental fetch engine
pub mod engine;

/// Platform clients and HTTP transport
pub mod fetcher;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Append-only raw record store
pub mod store;

/// Raw store to Kapa.ai output conversion
pub mod transform;

/// Source platform the exporter pulls from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    /// Pylon support platform (REST API)
    #[serde(rename = "pylon")]
    Pylon,
    /// Linear issue tracker (GraphQL API)
    #[serde(rename = "linear")]
    Linear,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Platform::Pylon => "pylon",
            Platform::Linear => "linear",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pylon" => Ok(Platform::Pylon),
            "linear" => Ok(Platform::Linear),
            _ => Err(format!("Invalid platform: {s}. Valid options: pylon, linear")),
        }
    }
}

/// A named, independently paginated entity stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Collection {
    /// Issue/ticket records
    #[serde(rename = "issues")]
    Issues,
    /// Threaded comments/messages attached to issues
    #[serde(rename = "comments")]
    Comments,
}

impl Collection {
    /// Stable name used for checkpoint files and raw store directories
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Issues => "issues",
            Collection::Comments => "comments",
        }
    }

    /// All collections in processing order (issues drive comments)
    pub fn all() -> [Collection; 2] {
        [Collection::Issues, Collection::Comments]
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Collection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "issues" => Ok(Collection::Issues),
            "comments" => Ok(Collection::Comments),
            _ => Err(format!(
                "Invalid collection: {s}. Valid options: issues, comments"
            )),
        }
    }
}

/// Revision marker for a fetched record, used to resolve "current" state
/// among duplicates.
///
/// Derived from the record's `updatedAt`/`updated_at` field, falling back to
/// `createdAt`/`created_at`, then to the Unix epoch so a record with no
/// usable timestamp is still writable exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Revision(pub DateTime<Utc>);

impl Revision {
    /// Extract a revision from a raw payload.
    pub fn from_payload(payload: &Value) -> Self {
        for field in ["updatedAt", "updated_at", "createdAt", "created_at"] {
            if let Some(ts) = payload.get(field).and_then(Value::as_str) {
                if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
                    return Revision(dt.with_timezone(&Utc));
                }
            }
        }
        Revision(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// A single fetched entity (issue or comment) with a stable external ID,
/// a revision indicator, and its full opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// Stable external ID assigned by the source platform
    pub external_id: String,
    /// Revision marker (update timestamp)
    pub revision: Revision,
    /// Full fetched payload
    pub payload: Value,
}

impl Record {
    /// Build a record from a raw payload, pulling the ID from the `id` field.
    ///
    /// Returns `None` if the payload carries no string `id`.
    pub fn from_payload(payload: Value) -> Option<Self> {
        let external_id = payload.get("id")?.as_str()?.to_string();
        let revision = Revision::from_payload(&payload);
        Some(Record {
            external_id,
            revision,
            payload,
        })
    }
}

/// Outcome of a fetch run for one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// All pages fetched, checkpoint reached the end of the collection
    #[serde(rename = "success")]
    Success,
    /// Stopped early (retry budget exhausted or shutdown) but checkpoint is
    /// valid; requires operator re-invocation
    #[serde(rename = "partial")]
    Partial,
    /// Fatal error; checkpoint untouched, safe to resume after the cause is
    /// addressed
    #[serde(rename = "failed")]
    Failed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunOutcome::Success => "success",
            RunOutcome::Partial => "partial",
            RunOutcome::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

//! Append-only raw record store
//!
//! The auditable intermediate format between the fetch engine and the
//! transform pipeline. One JSONL file per record, addressable by
//! (collection, external ID); newer revisions append, nothing is ever
//! rewritten in place.

pub mod raw;

pub use raw::{RawStore, StoredRecord, WriteOutcome};

/// Raw store errors.
///
/// Any error here is fatal for the run: checkpoint correctness cannot be
/// guaranteed once writes start failing.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error (disk full, permission)
    #[error("storage write failure: {0}")]
    Io(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

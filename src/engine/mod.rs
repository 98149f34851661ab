//! Fetch engine: rate limiting, run orchestration, and outcome bookkeeping

use crate::cursor::CursorError;
use crate::fetcher::FetchError;

pub mod executor;
pub mod job;
pub mod rate_limit;

pub use executor::SyncExecutor;
pub use job::{CollectionSummary, RunSummary};

/// Errors raised while setting up or administering the engine.
///
/// Errors during a run itself never escape [`SyncExecutor::run`]; they are
/// folded into the per-collection outcomes instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The source client could not be constructed
    #[error("failed to initialize source client: {0}")]
    ClientInit(#[from] FetchError),

    /// Checkpoint state could not be administered
    #[error("checkpoint state error: {0}")]
    Cursor(#[from] CursorError),
}

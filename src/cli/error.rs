//! CLI error types and conversions

use crate::config::ConfigError;
use crate::cursor::CursorError;
use crate::engine::EngineError;
use crate::store::StoreError;
use crate::transform::TransformError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Engine setup or administration error
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Checkpoint store error
    #[error("checkpoint error: {0}")]
    Cursor(#[from] CursorError),

    /// Raw store error
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Transform pipeline error
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The sync finished but at least one collection did not succeed
    #[error("sync incomplete: one or more collections did not finish")]
    SyncIncomplete,
}

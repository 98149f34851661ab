//! CLI command implementations

pub mod error;
pub mod sync;
pub mod transform;

pub use error::CliError;
pub use sync::{Cli, Commands, ResetArgs, SyncArgs};
pub use transform::TransformArgs;

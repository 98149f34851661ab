//! Durable pagination checkpoints
//!
//! One checkpoint file per collection records how far a traversal got and
//! lets the next run resume without gaps.

pub mod checkpoint;
pub mod store;

pub use checkpoint::Checkpoint;
pub use store::{CursorError, CursorStore};

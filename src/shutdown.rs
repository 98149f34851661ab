//! Cooperative cancellation for fetch runs.
//!
//! A page persist and the checkpoint write that follows it must never be
//! torn apart by an interrupt, so Ctrl+C only trips a flag here. The fetch
//! loop polls the flag between pages and finishes the in-flight page first,
//! which keeps every checkpoint resumable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Cloneable handle to a run's stop flag.
pub type ShutdownHandle = Arc<ShutdownSignal>;

/// Stop flag polled by the fetch loop at page boundaries.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    stop: AtomicBool,
}

impl ShutdownSignal {
    /// Create a fresh handle for one run.
    pub fn handle() -> ShutdownHandle {
        Arc::new(Self::default())
    }

    /// Spawn the Ctrl+C listener that trips this signal.
    ///
    /// Must be called inside a tokio runtime. A second Ctrl+C has no
    /// further effect; the in-flight page still completes.
    pub fn listen_for_ctrl_c(self: &Arc<Self>) {
        let signal = Arc::clone(self);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Ctrl+C received, stopping at the next page boundary");
                signal.trip();
            }
        });
    }

    /// Request a stop at the next page boundary.
    pub fn trip(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_tripped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

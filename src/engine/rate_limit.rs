//! Rate limiting with exponential backoff
//!
//! Fixed-window request limiting sized to the remote API quota, plus the
//! backoff schedule applied when the remote signals 429.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

/// Base delay for exponential backoff
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Backoff cap; retry 5 would otherwise wait 32s
const MAX_BACKOFF_MS: u64 = 30_000;

/// Fixed-window rate limiter shared across all transport calls.
///
/// `acquire` suspends until window capacity is available rather than
/// failing; permits flow back once the window elapses. Suspended callers
/// hold no locks.
#[derive(Clone)]
pub struct RateLimiter {
    max_requests: usize,
    semaphore: Arc<Semaphore>,
    window: Duration,
}

impl RateLimiter {
    /// Create a limiter allowing `max_requests` per `window`.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            semaphore: Arc::new(Semaphore::new(max_requests)),
            window,
        }
    }

    /// Maximum requests per window.
    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    /// Acquire one request slot, suspending until capacity is available.
    ///
    /// The permit is held for the window duration in a spawned task so the
    /// slot is only returned once the window has elapsed; dropping it
    /// earlier would let a burst exceed the remote quota.
    pub async fn acquire(&self) -> Result<(), RateLimitError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| RateLimitError::AcquireError(e.to_string()))?;

        let window = self.window;
        tokio::spawn(async move {
            sleep(window).await;
            drop(permit);
        });

        Ok(())
    }
}

/// Compute the backoff delay for a retry attempt (0-indexed).
///
/// base 1s doubled per attempt, capped at 30s, with up to 20% additive
/// jitter so concurrent workers do not retry in lockstep. Pure function so
/// tests can assert the schedule without sleeping.
pub fn backoff_delay(attempt: u32) -> Duration {
    let exp = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    let capped = exp.min(MAX_BACKOFF_MS);
    let jitter = jitter_ms(capped / 5);
    Duration::from_millis(capped + jitter)
}

/// Bounds of the backoff schedule without jitter, for callers that log the
/// planned wait.
pub fn backoff_base(attempt: u32) -> Duration {
    let exp = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(exp.min(MAX_BACKOFF_MS))
}

fn jitter_ms(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    // Subsecond clock noise is enough spread here; no need for a PRNG.
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    nanos % max
}

/// Rate limiter errors
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Failed to acquire a request slot
    #[error("failed to acquire rate limit slot: {0}")]
    AcquireError(String),
}

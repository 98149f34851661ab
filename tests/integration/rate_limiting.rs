//! Rate limiter window compliance under virtual time.

use std::time::Duration;
use ticket_data_exporter::engine::rate_limit::{backoff_base, backoff_delay, RateLimiter};

#[tokio::test(start_paused = true)]
async fn test_window_capacity_is_never_exceeded() {
    let limiter = RateLimiter::new(2, Duration::from_secs(60));
    let start = tokio::time::Instant::now();

    limiter.acquire().await.unwrap();
    limiter.acquire().await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));

    // Third slot only opens once the first window has fully elapsed.
    limiter.acquire().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_full_window_reopens_after_elapse() {
    let limiter = RateLimiter::new(3, Duration::from_secs(10));
    for _ in 0..3 {
        limiter.acquire().await.unwrap();
    }

    tokio::time::sleep(Duration::from_secs(10)).await;

    // A whole new window's worth of slots is available without waiting.
    let start = tokio::time::Instant::now();
    for _ in 0..3 {
        limiter.acquire().await.unwrap();
    }
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_backoff_doubles_and_caps() {
    assert_eq!(backoff_base(0), Duration::from_secs(1));
    assert_eq!(backoff_base(1), Duration::from_secs(2));
    assert_eq!(backoff_base(4), Duration::from_secs(16));
    assert_eq!(backoff_base(5), Duration::from_secs(30));
    assert_eq!(backoff_base(30), Duration::from_secs(30));
}

#[test]
fn test_backoff_jitter_stays_within_twenty_percent() {
    for attempt in 0..8 {
        let base = backoff_base(attempt);
        let delay = backoff_delay(attempt);
        assert!(delay >= base, "attempt {attempt}: {delay:?} < {base:?}");
        assert!(
            delay <= base + base / 5,
            "attempt {attempt}: {delay:?} > {base:?} + 20%"
        );
    }
}

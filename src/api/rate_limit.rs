//! Inter-request rate limiting for the tracker API.
//!
//! The tracker allows roughly one AJAX request per second. The limiter owns
//! the time of the last request and an async `acquire` that every outbound
//! call goes through; waiting is a single sleep until the earliest allowed
//! send time, not a poll loop. Holding the internal lock across the sleep
//! is what serializes concurrent callers onto the one rate-limited channel.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Stateful inter-request limiter: at most one request per interval.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Create a limiter enforcing `interval` between consecutive requests.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_request: Mutex::new(None),
        }
    }

    /// Wait until a request may be sent, then stamp the send time.
    ///
    /// The first call returns immediately. Later calls sleep until
    /// `last_request + interval` has passed.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.interval).await;
        }
        *last = Some(Instant::now());
    }

    /// Push the next allowed send time further out, for endpoints the
    /// tracker throttles harder (e.g. torrent-file downloads).
    pub async fn penalize(&self, extra: Duration) {
        let mut last = self.last_request.lock().await;
        let base = last.unwrap_or_else(Instant::now);
        *last = Some(base + extra);
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_acquire_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_acquire_waits_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire().await;

        let before = Instant::now();
        limiter.acquire().await;
        let waited = Instant::now() - before;
        assert!(waited >= Duration::from_secs(1), "waited {:?}", waited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_wait_after_interval_elapsed() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_penalize_extends_wait() {
        let limiter = RateLimiter::new(Duration::from_secs(1));
        limiter.acquire().await;
        limiter.penalize(Duration::from_secs(2)).await;

        let before = Instant::now();
        limiter.acquire().await;
        let waited = Instant::now() - before;
        assert!(waited >= Duration::from_secs(3), "waited {:?}", waited);
    }
}

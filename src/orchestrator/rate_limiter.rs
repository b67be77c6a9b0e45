//! Process-wide minimum spacing between outbound LLM requests (§4.3).

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

pub struct RateLimiter {
    min_spacing: Duration,
    last_acquired: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_acquired: Mutex::new(None),
        }
    }

    pub fn from_secs_f64(min_spacing_s: f64) -> Self {
        Self::new(Duration::from_secs_f64(min_spacing_s.max(0.0)))
    }

    /// Block until at least `min_spacing` has elapsed since the previous
    /// `acquire()` returned. The mutex is held only long enough to reserve
    /// the next slot; the sleep itself happens outside the lock so a
    /// sleeping caller never blocks the next caller's timestamp read.
    pub async fn acquire(&self) {
        let wait = {
            let mut last = self.last_acquired.lock().await;
            let now = Instant::now();
            let scheduled = match *last {
                Some(prev) => (prev + self.min_spacing).max(now),
                None => now,
            };
            *last = Some(scheduled);
            scheduled - now
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn successive_acquisitions_are_spaced_by_at_least_min_spacing() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(50)));
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(100),
            "expected >= 100ms between three acquisitions, got {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn concurrent_acquisitions_are_still_spaced() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(30)));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(90));
    }
}

//! A token-bucket rate limiter: an explicit, cloneable value the
//! [`super::Coordinator`] owns, rather than process-global statics.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }
}

/// Shared, cheaply-cloneable rate limiter. `acquire` resolves once a token
/// is available; the caller is responsible for applying its own deadline
/// on top (the coordinator's dwell timeout).
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<Mutex<Bucket>>,
}

impl RateLimiter {
    pub fn new(requests_per_sec: u32) -> Self {
        let rate = f64::from(requests_per_sec.max(1));
        Self {
            bucket: Arc::new(Mutex::new(Bucket {
                tokens: rate,
                capacity: rate,
                refill_per_sec: rate,
                last_refill: Instant::now(),
            })),
        }
    }

    pub async fn acquire(&self) {
        loop {
            let sleep_for = {
                let mut bucket = self.bucket.lock().await;
                bucket.refill();
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                let deficit = 1.0 - bucket.tokens;
                Duration::from_secs_f64(deficit / bucket.refill_per_sec)
            };
            tokio::time::sleep(sleep_for.max(Duration::from_millis(1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquires_up_to_capacity_immediately() {
        let limiter = RateLimiter::new(5);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn blocks_once_capacity_exhausted() {
        let limiter = RateLimiter::new(2);
        limiter.acquire().await;
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}

use std::{sync::Arc, time::Duration};

use tokio::time::sleep;

use crate::core::rate_limiter::RateLimiter;

/// Periodically drops rate limit buckets that have refilled completely.
pub struct BucketSweeper {
    rate_limiter: Arc<RateLimiter>,
    interval: Duration,
}

impl BucketSweeper {
    pub fn new(rate_limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        Self {
            rate_limiter,
            interval,
        }
    }

    /// Run one sweep, returning the number of evicted buckets.
    pub fn sweep_once(&self) -> usize {
        self.rate_limiter.evict_idle()
    }

    /// Run the sweep loop until the task is aborted.
    pub async fn run(&self) {
        tracing::info!(
            "Starting rate limit bucket sweeper with interval: {:?}, replenish interval: {:?}",
            self.interval,
            self.rate_limiter.replenish_interval()
        );

        loop {
            sleep(self.interval).await;

            let evicted = self.sweep_once();
            tracing::debug!(
                evicted,
                tracked = self.rate_limiter.len(),
                "Rate limit sweep completed"
            );
        }
    }
}

//! Per-client token bucket rate limiting built atop `governor`.
//!
//! Each client key owns an independent GCRA cell in a keyed `governor`
//! limiter. A cell is updated with a compare-and-swap on its theoretical
//! arrival time, so requests for different keys never contend and requests
//! for the same key are linearized without a lock. The quota allows a burst
//! of `capacity` and replenishes one token every
//! `refill_period / refill_tokens`, which is a token bucket with continuous
//! refill tracked in whole nanoseconds. Denied checks leave the cell untouched.
//!
//! Once a key has been quiet long enough for its bucket to be full again its
//! state is indistinguishable from a new one; `evict_idle` drops those keys so
//! the store stays bounded by the number of recently active clients.
use std::{fmt, num::NonZeroU32, time::Duration};

use governor::{
    Quota,
    clock::{Clock, DefaultClock},
    middleware::NoOpMiddleware,
    state::keyed::DefaultKeyedStateStore,
};

use crate::config::{models::RateLimitConfig, validation::parse_duration_field};

pub type KeyedLimiterImpl<C> = governor::RateLimiter<
    String,
    DefaultKeyedStateStore<String>,
    C,
    NoOpMiddleware<<C as Clock>::Instant>,
>;

pub struct RateLimiter<C: Clock = DefaultClock> {
    limiter: KeyedLimiterImpl<C>,
    capacity: NonZeroU32,
    replenish_interval: Duration,
}

impl<C: Clock> fmt::Debug for RateLimiter<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("capacity", &self.capacity)
            .field("replenish_interval", &self.replenish_interval)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_tokens: u32, refill_period: Duration) -> Result<Self, String> {
        Self::with_clock(capacity, refill_tokens, refill_period, DefaultClock::default())
    }

    /// Build a limiter from a `RateLimitConfig` definition.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, String> {
        let period = parse_duration_field("rate_limit.refill_period", &config.refill_period)
            .map_err(|e| e.to_string())?;

        let limiter = Self::new(config.capacity, config.refill_tokens, period)?;

        tracing::info!(
            capacity = config.capacity,
            refill_tokens = config.refill_tokens,
            refill_period = %config.refill_period,
            replenish_interval = ?limiter.replenish_interval,
            "Creating rate limiter"
        );

        Ok(limiter)
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Build a limiter reading time from `clock`.
    pub fn with_clock(
        capacity: u32,
        refill_tokens: u32,
        refill_period: Duration,
        clock: C,
    ) -> Result<Self, String> {
        let capacity = NonZeroU32::new(capacity)
            .ok_or_else(|| "Rate limit 'capacity' must be greater than 0".to_string())?;
        if refill_tokens == 0 {
            return Err("Rate limit 'refill_tokens' must be greater than 0".to_string());
        }

        let replenish_interval = refill_period / refill_tokens;
        let quota = Quota::with_period(replenish_interval)
            .ok_or_else(|| {
                format!(
                    "Rate limit refill of {refill_tokens} per {refill_period:?} is too fast to track"
                )
            })?
            .allow_burst(capacity);

        Ok(Self {
            limiter: governor::RateLimiter::new(quota, DefaultKeyedStateStore::default(), clock),
            capacity,
            replenish_interval,
        })
    }

    /// Time for a single token to come back.
    pub fn replenish_interval(&self) -> Duration {
        self.replenish_interval
    }

    pub fn capacity(&self) -> u32 {
        self.capacity.get()
    }

    /// Take one token from `key`'s bucket. Unknown keys start with a full bucket.
    pub fn try_consume(&self, key: &str) -> bool {
        self.limiter.check_key(&key.to_string()).is_ok()
    }

    /// Drop keys whose bucket has refilled completely, returning how many went.
    pub fn evict_idle(&self) -> usize {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        let remaining = self.limiter.len();
        let evicted = before.saturating_sub(remaining);

        if evicted > 0 {
            tracing::debug!(evicted, remaining, "Evicted idle rate limit buckets");
        }
        evicted
    }

    /// Number of tracked client keys.
    pub fn len(&self) -> usize {
        self.limiter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiter.is_empty()
    }
}

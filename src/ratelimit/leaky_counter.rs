//! Interval counter ("leaky bucket") rate limiting.
//!
//! Every key counts admitted requests since the last global tick. Each tick
//! clears the count of every active key at once; quota does not drain in
//! proportion to the time elapsed since a key's own last request. Keys that
//! stay at zero for `max_idle_ticks` consecutive ticks are deleted.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use super::backend::{bucket_not_found, Dimension, Limits, RateLimiterBackend};
use super::store::DimensionStores;
use crate::error::Result;

/// Per-key state for the interval counter.
#[derive(Debug, Default)]
pub struct LeakyBucket {
    /// Requests admitted since the last tick
    rate: AtomicU64,
    /// Consecutive ticks with no admitted request
    idle_ticks: AtomicU64,
}

impl LeakyBucket {
    pub fn rate(&self) -> u64 {
        self.rate.load(Ordering::Acquire)
    }

    pub fn idle_ticks(&self) -> u64 {
        self.idle_ticks.load(Ordering::Acquire)
    }

    fn try_acquire(&self, limit: u64) -> bool {
        self.rate
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |rate| {
                (rate < limit).then_some(rate + 1)
            })
            .is_ok()
    }

    fn reset(&self) {
        self.rate.store(0, Ordering::Release);
        self.idle_ticks.store(0, Ordering::Release);
    }

    /// Apply one tick. Returns false once the bucket should be deleted.
    fn tick(&self, max_idle_ticks: u64) -> bool {
        if self.rate.load(Ordering::Acquire) > 0 {
            self.reset();
            return true;
        }
        let idle = self.idle_ticks.fetch_add(1, Ordering::AcqRel) + 1;
        max_idle_ticks == 0 || idle < max_idle_ticks
    }
}

/// Interval counter limiter over the IP, password and login dimensions.
///
/// `max_idle_ticks == 0` keeps idle keys forever; ticks still reset counts.
pub struct LeakyCounterLimiter {
    buckets: DimensionStores<LeakyBucket>,
    limits: Limits,
    max_idle_ticks: u64,
}

impl LeakyCounterLimiter {
    pub fn new(limits: Limits, max_idle_ticks: u64) -> Self {
        Self {
            buckets: DimensionStores::new(),
            limits,
            max_idle_ticks,
        }
    }

    pub fn bucket(&self, dimension: Dimension, key: &str) -> Option<std::sync::Arc<LeakyBucket>> {
        self.buckets.get(dimension).get(key)
    }
}

impl RateLimiterBackend for LeakyCounterLimiter {
    fn allow(&self, dimension: Dimension, key: &str) -> bool {
        let bucket = self
            .buckets
            .get(dimension)
            .get_or_create_with(key, LeakyBucket::default);
        let admitted = bucket.try_acquire(self.limits.get(dimension));

        trace!(%dimension, admitted, rate = bucket.rate(), "Leaky counter check");
        admitted
    }

    fn clean(&self, dimension: Dimension, key: &str) -> Result<()> {
        let bucket = self
            .buckets
            .get(dimension)
            .get(key)
            .ok_or_else(|| bucket_not_found(dimension, key))?;
        bucket.reset();
        Ok(())
    }

    fn sweep(&self) {
        for dimension in Dimension::CHECK_ORDER {
            let removed = self
                .buckets
                .get(dimension)
                .sweep(|bucket| bucket.tick(self.max_idle_ticks));
            if removed > 0 {
                debug!(%dimension, removed, "Evicted idle leaky counter buckets");
            }
        }
    }

    fn bucket_count(&self, dimension: Dimension) -> usize {
        self.buckets.get(dimension).len()
    }
}

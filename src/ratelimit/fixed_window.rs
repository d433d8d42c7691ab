//! Fixed window rate limiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::backend::{bucket_not_found, Dimension, Limits, RateLimiterBackend};
use super::clock::{nanos, Clock};
use super::store::DimensionStores;
use crate::error::Result;

/// Per-key state for the fixed window algorithm.
///
/// All fields are updated with atomics; there is no per-key lock.
#[derive(Debug)]
pub struct WindowBucket {
    /// Requests admitted in the current window
    count: AtomicU64,
    /// When the current window started
    window_start: AtomicU64,
    /// Last admitted request or reset, used for idle eviction
    last_access: AtomicU64,
}

impl WindowBucket {
    fn new(now: u64) -> Self {
        Self {
            count: AtomicU64::new(0),
            window_start: AtomicU64::new(now),
            last_access: AtomicU64::new(now),
        }
    }

    /// Requests admitted in the current window.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    /// Start a new window if the current one has expired.
    fn maybe_reset_window(&self, now: u64, interval: u64) {
        let start = self.window_start.load(Ordering::Acquire);
        if now.saturating_sub(start) < interval {
            return;
        }
        // Only the thread that moves the window forward clears the count.
        if self
            .window_start
            .compare_exchange(start, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.count.store(0, Ordering::Release);
        }
    }

    fn try_acquire(&self, limit: u64, now: u64) -> bool {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current >= limit {
                return false;
            }
            match self.count.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.last_access.store(now, Ordering::Release);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    fn reset(&self, now: u64) {
        self.count.store(0, Ordering::Release);
        self.window_start.store(now, Ordering::Release);
        self.last_access.store(now, Ordering::Release);
    }
}

/// Fixed window limiter over the IP, password and login dimensions.
///
/// A key admits up to `limit` requests per `interval`. The window restarts
/// lazily on the first request after it expires, and the eviction sweep
/// (run every `interval`) also clears any non-zero count. Keys with nothing
/// to clear are deleted once idle for longer than `ttl`.
pub struct FixedWindowLimiter {
    buckets: DimensionStores<WindowBucket>,
    limits: Limits,
    interval: u64,
    ttl: u64,
    clock: Arc<dyn Clock>,
}

impl FixedWindowLimiter {
    pub fn new(limits: Limits, interval: Duration, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            buckets: DimensionStores::new(),
            limits,
            interval: nanos(interval),
            ttl: nanos(ttl),
            clock,
        }
    }

    /// Current bucket for a key, if any.
    pub fn bucket(&self, dimension: Dimension, key: &str) -> Option<Arc<WindowBucket>> {
        self.buckets.get(dimension).get(key)
    }
}

impl RateLimiterBackend for FixedWindowLimiter {
    fn allow(&self, dimension: Dimension, key: &str) -> bool {
        let now = self.clock.now();
        let bucket = self
            .buckets
            .get(dimension)
            .get_or_create_with(key, || WindowBucket::new(now));

        bucket.maybe_reset_window(now, self.interval);
        let admitted = bucket.try_acquire(self.limits.get(dimension), now);

        trace!(%dimension, admitted, count = bucket.count(), "Fixed window check");
        admitted
    }

    fn clean(&self, dimension: Dimension, key: &str) -> Result<()> {
        let bucket = self
            .buckets
            .get(dimension)
            .get(key)
            .ok_or_else(|| bucket_not_found(dimension, key))?;
        bucket.reset(self.clock.now());
        Ok(())
    }

    fn sweep(&self) {
        let now = self.clock.now();
        for dimension in Dimension::CHECK_ORDER {
            let removed = self.buckets.get(dimension).sweep(|bucket| {
                if bucket.count.load(Ordering::Acquire) > 0 {
                    bucket.count.store(0, Ordering::Release);
                    bucket.window_start.store(now, Ordering::Release);
                    return true;
                }
                now.saturating_sub(bucket.last_access.load(Ordering::Acquire)) <= self.ttl
            });
            if removed > 0 {
                debug!(%dimension, removed, "Evicted idle fixed window buckets");
            }
        }
    }

    fn bucket_count(&self, dimension: Dimension) -> usize {
        self.buckets.get(dimension).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BruteguardError;
    use crate::ratelimit::clock::ManualClock;

    const LIMITS: Limits = Limits {
        ip: 1000,
        password: 100,
        login: 10,
    };

    fn limiter(clock: Arc<ManualClock>) -> FixedWindowLimiter {
        FixedWindowLimiter::new(
            LIMITS,
            Duration::from_millis(100),
            Duration::from_secs(1),
            clock,
        )
    }

    #[test]
    fn test_admits_up_to_limit() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(clock);

        for _ in 0..10 {
            assert!(limiter.allow(Dimension::Login, "bob"));
        }
        assert!(!limiter.allow(Dimension::Login, "bob"));
        assert_eq!(limiter.bucket(Dimension::Login, "bob").unwrap().count(), 10);
    }

    #[test]
    fn test_new_window_restores_quota() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(clock.clone());

        for _ in 0..10 {
            assert!(limiter.allow(Dimension::Login, "bob"));
        }
        assert!(!limiter.allow(Dimension::Login, "bob"));

        clock.advance(Duration::from_millis(99));
        assert!(!limiter.allow(Dimension::Login, "bob"));

        clock.advance(Duration::from_millis(1));
        for _ in 0..10 {
            assert!(limiter.allow(Dimension::Login, "bob"));
        }
        assert!(!limiter.allow(Dimension::Login, "bob"));
    }

    #[test]
    fn test_zero_limit_always_denies() {
        let clock = Arc::new(ManualClock::new());
        let limiter = FixedWindowLimiter::new(
            Limits {
                ip: 0,
                password: 1,
                login: 1,
            },
            Duration::from_millis(100),
            Duration::from_secs(1),
            clock,
        );

        assert!(!limiter.allow(Dimension::Ip, "127.0.0.1"));
        assert!(limiter.allow(Dimension::Password, "qwerty"));
    }

    #[test]
    fn test_concurrent_cold_key_admits_exactly_limit() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(clock);
        let barrier = std::sync::Barrier::new(20);
        let admitted = AtomicU64::new(0);

        std::thread::scope(|s| {
            for _ in 0..20 {
                s.spawn(|| {
                    barrier.wait();
                    if limiter.allow(Dimension::Login, "bob") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn test_clean_restores_quota() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(clock);

        for _ in 0..11 {
            limiter.allow(Dimension::Login, "bob");
        }
        limiter.clean(Dimension::Login, "bob").unwrap();

        for _ in 0..10 {
            assert!(limiter.allow(Dimension::Login, "bob"));
        }
    }

    #[test]
    fn test_clean_unknown_key() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(clock);

        let err = limiter.clean(Dimension::Ip, "10.0.0.1").unwrap_err();
        assert!(matches!(err, BruteguardError::BucketNotFound(_)));
        assert_eq!(limiter.bucket_count(Dimension::Ip), 0);
    }

    #[test]
    fn test_sweep_resets_active_and_evicts_idle() {
        let clock = Arc::new(ManualClock::new());
        let limiter = limiter(clock.clone());

        for _ in 0..10 {
            limiter.allow(Dimension::Login, "bob");
        }

        // Active key: count is cleared, bucket kept.
        limiter.sweep();
        assert_eq!(limiter.bucket(Dimension::Login, "bob").unwrap().count(), 0);
        assert!(limiter.allow(Dimension::Login, "bob"));

        // Still within ttl of the last access.
        clock.advance(Duration::from_millis(500));
        limiter.sweep();
        limiter.sweep();
        assert_eq!(limiter.bucket_count(Dimension::Login), 1);

        clock.advance(Duration::from_millis(501));
        limiter.sweep();
        assert_eq!(limiter.bucket_count(Dimension::Login), 0);
    }
}

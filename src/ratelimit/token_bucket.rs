//! Token bucket rate limiting with lazy refill.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::backend::{bucket_not_found, Dimension, Limits, RateLimiterBackend};
use super::clock::{nanos, Clock};
use super::store::DimensionStores;
use crate::error::Result;

#[derive(Debug, Default)]
struct TokenState {
    tokens: u64,
    /// `None` until the first request fills the bucket
    last_refill: Option<u64>,
}

/// Per-key token bucket.
///
/// Refill and consume form one compound step, so the state sits behind a
/// per-bucket lock rather than atomics.
#[derive(Debug, Default)]
pub struct TokenBucket {
    state: Mutex<TokenState>,
}

impl TokenBucket {
    pub fn tokens(&self) -> u64 {
        self.state.lock().tokens
    }
}

/// Refill configuration for one dimension.
#[derive(Debug, Clone, Copy)]
struct Refill {
    limit: u64,
    /// Time to earn one token; `None` when the limit is zero
    period: Option<u64>,
}

impl Refill {
    fn new(limit: u64, interval: u64) -> Self {
        let period = interval.checked_div(limit).map(|period| period.max(1));
        Self { limit, period }
    }
}

/// Token bucket limiter over the IP, password and login dimensions.
///
/// A bucket starts full with `limit` tokens and earns one token every
/// `interval / limit`, computed on access. The refill timestamp moves to
/// "now" on every access, whether or not a token was earned, and the balance
/// never exceeds `limit`. Buckets untouched for longer than one refill period
/// plus `ttl` are evicted.
pub struct TokenBucketLimiter {
    buckets: DimensionStores<TokenBucket>,
    ip: Refill,
    password: Refill,
    login: Refill,
    ttl: u64,
    clock: Arc<dyn Clock>,
}

impl TokenBucketLimiter {
    pub fn new(limits: Limits, interval: Duration, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let interval = nanos(interval);
        Self {
            buckets: DimensionStores::new(),
            ip: Refill::new(limits.ip, interval),
            password: Refill::new(limits.password, interval),
            login: Refill::new(limits.login, interval),
            ttl: nanos(ttl),
            clock,
        }
    }

    /// Time to earn one token on a dimension, `None` if it never refills.
    pub fn refill_period(&self, dimension: Dimension) -> Option<Duration> {
        self.refill(dimension).period.map(Duration::from_nanos)
    }

    pub fn bucket(&self, dimension: Dimension, key: &str) -> Option<Arc<TokenBucket>> {
        self.buckets.get(dimension).get(key)
    }

    fn refill(&self, dimension: Dimension) -> Refill {
        match dimension {
            Dimension::Ip => self.ip,
            Dimension::Password => self.password,
            Dimension::Login => self.login,
        }
    }
}

impl RateLimiterBackend for TokenBucketLimiter {
    fn allow(&self, dimension: Dimension, key: &str) -> bool {
        let refill = self.refill(dimension);
        let bucket = self
            .buckets
            .get(dimension)
            .get_or_create_with(key, TokenBucket::default);

        let mut state = bucket.state.lock();
        let now = self.clock.now();
        match (state.last_refill, refill.period) {
            (None, _) => state.tokens = refill.limit,
            (Some(last), Some(period)) => {
                let earned = now.saturating_sub(last) / period;
                state.tokens = state.tokens.saturating_add(earned).min(refill.limit);
            }
            (Some(_), None) => {}
        }
        state.last_refill = Some(now);

        let admitted = state.tokens > 0;
        if admitted {
            state.tokens -= 1;
        }

        trace!(%dimension, admitted, tokens = state.tokens, "Token bucket check");
        admitted
    }

    fn clean(&self, dimension: Dimension, key: &str) -> Result<()> {
        let bucket = self
            .buckets
            .get(dimension)
            .get(key)
            .ok_or_else(|| bucket_not_found(dimension, key))?;

        let mut state = bucket.state.lock();
        state.tokens = self.refill(dimension).limit;
        state.last_refill = Some(self.clock.now());
        Ok(())
    }

    fn sweep(&self) {
        let now = self.clock.now();
        for dimension in Dimension::CHECK_ORDER {
            let period = self.refill(dimension).period.unwrap_or(0);
            let removed = self.buckets.get(dimension).sweep(|bucket| {
                match bucket.state.lock().last_refill {
                    // Created but not yet filled: a request is in flight.
                    None => true,
                    Some(last) => now.saturating_sub(last.saturating_add(period)) <= self.ttl,
                }
            });
            if removed > 0 {
                debug!(%dimension, removed, "Evicted idle token buckets");
            }
        }
    }

    fn bucket_count(&self, dimension: Dimension) -> usize {
        self.buckets.get(dimension).len()
    }
}

//! Rate limiter facade combining the three dimensions.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::backend::{Dimension, Limits, RateLimiterBackend};
use super::clock::{Clock, SystemClock};
use super::evictor::Evictor;
use super::fixed_window::FixedWindowLimiter;
use super::leaky_counter::LeakyCounterLimiter;
use super::token_bucket::TokenBucketLimiter;
use crate::error::{BruteguardError, Result};

/// Rate limiting algorithm, chosen once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    FixedWindow,
    LeakyCounter,
    TokenBucket,
}

/// Configuration for a [`RateLimiter`].
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    pub algorithm: Algorithm,
    pub limits: Limits,
    /// Window length, refill interval and sweep period
    pub interval: Duration,
    /// Idle time before a bucket is evicted (fixed window, token bucket)
    pub ttl: Duration,
    /// Idle ticks before a bucket is evicted (leaky counter); 0 disables
    pub max_idle_ticks: u64,
}

/// The rate limiter consulted for every authentication attempt.
///
/// Owns one bucket store per dimension (inside the chosen backend) and the
/// background task that evicts idle buckets.
pub struct RateLimiter {
    backend: Arc<dyn RateLimiterBackend>,
    evictor: Evictor,
    algorithm: Algorithm,
}

impl RateLimiter {
    /// Create a rate limiter and start its eviction task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: RateLimiterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(config: RateLimiterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.interval.is_zero() {
            return Err(BruteguardError::Config(
                "rate limiting interval must be greater than zero".to_string(),
            ));
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(BruteguardError::Config(
                "rate limiter must be created inside a tokio runtime".to_string(),
            ));
        }

        let backend: Arc<dyn RateLimiterBackend> = match config.algorithm {
            Algorithm::FixedWindow => Arc::new(FixedWindowLimiter::new(
                config.limits,
                config.interval,
                config.ttl,
                clock,
            )),
            Algorithm::LeakyCounter => {
                Arc::new(LeakyCounterLimiter::new(config.limits, config.max_idle_ticks))
            }
            Algorithm::TokenBucket => Arc::new(TokenBucketLimiter::new(
                config.limits,
                config.interval,
                config.ttl,
                clock,
            )),
        };

        let evictor = Evictor::spawn(Arc::clone(&backend), config.interval);

        info!(
            algorithm = ?config.algorithm,
            limit_ip = config.limits.ip,
            limit_password = config.limits.password,
            limit_login = config.limits.login,
            interval = ?config.interval,
            "Rate limiter initialized"
        );

        Ok(Self {
            backend,
            evictor,
            algorithm: config.algorithm,
        })
    }

    /// Check an authentication attempt against the IP, password and login
    /// limits, in that order.
    ///
    /// Stops at the first denying dimension. Quota already consumed on the
    /// dimensions checked before it is not given back.
    pub fn allow(&self, ip: &str, password: &str, login: &str) -> bool {
        for dimension in Dimension::CHECK_ORDER {
            let key = match dimension {
                Dimension::Ip => ip,
                Dimension::Password => password,
                Dimension::Login => login,
            };
            if !self.backend.allow(dimension, key) {
                debug!(%dimension, "Rate limit exceeded");
                return false;
            }
        }
        trace!("Rate limit check passed");
        true
    }

    /// Reset an IP bucket to full quota.
    pub fn clean_bucket_ip(&self, ip: &str) -> Result<()> {
        self.clean(Dimension::Ip, ip)
    }

    /// Reset a password bucket to full quota.
    pub fn clean_bucket_password(&self, password: &str) -> Result<()> {
        self.clean(Dimension::Password, password)
    }

    /// Reset a login bucket to full quota.
    pub fn clean_bucket_login(&self, login: &str) -> Result<()> {
        self.clean(Dimension::Login, login)
    }

    fn clean(&self, dimension: Dimension, key: &str) -> Result<()> {
        self.backend.clean(dimension, key)?;
        info!(%dimension, "Bucket cleaned");
        Ok(())
    }

    /// Stop the eviction task. Idempotent and safe to race.
    pub fn stop(&self) {
        self.evictor.stop();
    }

    /// Stop the eviction task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.evictor.shutdown().await;
    }

    /// Whether the eviction task is still running.
    pub fn is_evicting(&self) -> bool {
        self.evictor.is_running()
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Get the number of live buckets for a dimension.
    pub fn bucket_count(&self, dimension: Dimension) -> usize {
        self.backend.bucket_count(dimension)
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.evictor.stop();
    }
}

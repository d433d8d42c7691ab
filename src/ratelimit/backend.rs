//! Rate limiter trait shared by the fixed window, leaky counter and token
//! bucket implementations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BruteguardError, Result};

/// An independent axis along which authentication attempts are limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    Ip,
    Password,
    Login,
}

impl Dimension {
    /// The order in which the facade consults the dimensions.
    pub const CHECK_ORDER: [Dimension; 3] = [Dimension::Ip, Dimension::Password, Dimension::Login];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Ip => "ip",
            Dimension::Password => "password",
            Dimension::Login => "login",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum admitted requests per interval for each dimension.
///
/// A limit of zero denies every request on that dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    pub ip: u64,
    pub password: u64,
    pub login: u64,
}

impl Limits {
    pub fn get(&self, dimension: Dimension) -> u64 {
        match dimension {
            Dimension::Ip => self.ip,
            Dimension::Password => self.password,
            Dimension::Login => self.login,
        }
    }
}

/// Trait for rate limiting algorithms.
///
/// Each implementation owns one bucket store per [`Dimension`]. Checks never
/// fail: a key is either admitted or denied.
pub trait RateLimiterBackend: Send + Sync {
    /// Admit or deny one request for `key`, consuming quota when admitted.
    fn allow(&self, dimension: Dimension, key: &str) -> bool;

    /// Restore full quota for an existing key.
    ///
    /// Returns [`BucketNotFound`](crate::error::BruteguardError::BucketNotFound)
    /// if the key has no bucket.
    fn clean(&self, dimension: Dimension, key: &str) -> Result<()>;

    /// One eviction pass over every dimension.
    fn sweep(&self);

    /// Number of live buckets for a dimension.
    fn bucket_count(&self, dimension: Dimension) -> usize;
}

pub(crate) fn bucket_not_found(dimension: Dimension, key: &str) -> BruteguardError {
    BruteguardError::BucketNotFound(format!("{} {:?}", dimension, key))
}

//! Time sources for the rate limiting algorithms.

use std::time::{Duration, Instant};

/// A monotonic time source measured in nanoseconds.
///
/// The absolute value is meaningless; only differences between two readings
/// of the same clock are used.
pub trait Clock: Send + Sync + 'static {
    /// Current reading in nanoseconds.
    fn now(&self) -> u64;
}

/// Clock backed by [`Instant`], counting from its own creation.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        // u64 nanoseconds cover several centuries of uptime.
        self.origin.elapsed().as_nanos() as u64
    }
}

/// A clock that only moves when told to.
///
/// Used to drive windows, refills and TTLs deterministically in tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    nanos: std::sync::atomic::AtomicU64,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub(crate) fn advance(&self, by: Duration) {
        self.nanos
            .fetch_add(nanos(by), std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.nanos.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Convert a duration to clock units, saturating at `u64::MAX`.
pub(crate) fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

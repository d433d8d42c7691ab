//! Background eviction of idle buckets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::backend::RateLimiterBackend;

/// Handle to the periodic sweep task of one rate limiter.
pub(crate) struct Evictor {
    shutdown: CancellationToken,
    stopped: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Evictor {
    /// Spawn the sweep loop on the current tokio runtime.
    ///
    /// The first sweep happens one full `period` after spawning.
    pub(crate) fn spawn(backend: Arc<dyn RateLimiterBackend>, period: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let cancelled = shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!("Sweeping rate limit buckets");
                        backend.sweep();
                    }
                }
            }

            debug!("Eviction loop exited");
        });

        Self {
            shutdown,
            stopped: AtomicBool::new(false),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Signal the loop to exit. Safe to call any number of times, from any
    /// thread.
    pub(crate) fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.cancel();
        info!("Stopped bucket eviction");
    }

    /// Stop and wait for the loop to finish.
    pub(crate) async fn shutdown(&self) {
        self.stop();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            // A join error means the task panicked or was aborted; either
            // way it is no longer running.
            let _ = handle.await;
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Evictor {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

//! Rate limiting logic and state management.

mod backend;
mod clock;
mod evictor;
mod fixed_window;
mod leaky_counter;
mod limiter;
mod store;
mod token_bucket;

pub use backend::{Dimension, Limits, RateLimiterBackend};
pub use clock::{Clock, SystemClock};
pub use fixed_window::{FixedWindowLimiter, WindowBucket};
pub use leaky_counter::{LeakyBucket, LeakyCounterLimiter};
pub use limiter::{Algorithm, RateLimiter, RateLimiterConfig};
pub use store::{BucketStore, DimensionStores};
pub use token_bucket::{TokenBucket, TokenBucketLimiter};

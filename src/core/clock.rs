//! Monotonic time source for cache expiry.
//!
//! All freshness decisions are made against [`tokio::time::Instant`], which is
//! monotonic (wall-clock adjustments never move it) and can be paused and
//! advanced in tests.

use std::time::Duration;
use tokio::time::Instant;

/// A monotonic clock.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Instant;

    /// Time elapsed between `since` and `now`, zero if `now` is earlier.
    fn elapsed(&self, since: Instant, now: Instant) -> Duration {
        now.saturating_duration_since(since)
    }
}

/// Clock backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

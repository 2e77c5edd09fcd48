//! Monotonic timestamps used to order queue entries against receiver connection times.

use std::time::Instant;

/// A monotonic point in time, taken once at enqueue or at receiver accept.
///
/// Wraps `Instant` rather than wall-clock time so that ordering comparisons are immune to
/// clock adjustments; the reference implementation uses `CLOCK_MONOTONIC` for the same reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(Instant);

impl Timestamp {
    /// Capture the current monotonic time.
    pub fn now() -> Self {
        Timestamp(Instant::now())
    }

    /// True iff this timestamp plus `ttl` has already passed relative to `now`.
    pub fn expired_by(&self, ttl: std::time::Duration, now: Timestamp) -> bool {
        now.0.saturating_duration_since(self.0) >= ttl
    }
}

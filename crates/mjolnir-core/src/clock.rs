//! Monotonic time source.
//!
//! Admission decisions and rolling-window boundaries are derived from a
//! monotonic millisecond counter, never from wall-clock time, so system
//! clock adjustments cannot reopen a breaker or shift a window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic millisecond clock.
pub trait Clock: Send + Sync + 'static {
    /// Milliseconds elapsed since an arbitrary fixed origin.
    ///
    /// Successive calls never go backwards.
    fn now_millis(&self) -> u64;
}

/// Production clock backed by [`Instant`].
#[derive(Debug)]
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
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-stepped clock for deterministic tests.
///
/// Window and cooldown behavior can be exercised without real sleeps:
///
/// ```
/// use mjolnir_core::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// assert_eq!(clock.now_millis(), 0);
/// clock.advance(1_500);
/// assert_eq!(clock.now_millis(), 1_500);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a clock already positioned at `millis`.
    pub fn at(millis: u64) -> Self {
        Self {
            now: AtomicU64::new(millis),
        }
    }

    /// Moves the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

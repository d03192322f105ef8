//! Time-bucketed rolling event counter.
//!
//! A fixed ring of buckets covers the trailing window; each bucket holds
//! one atomic count per event kind and a start stamp aligned on
//! window/bucket-count boundaries of the monotonic clock. Writers are
//! amortized O(1), readers sum the ring without taking any lock.

use mjolnir_core::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Discrete event kinds tracked by the counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum EventKind {
    Success = 0,
    Failure = 1,
    ShortCircuited = 2,
    Timeout = 3,
    ThreadPoolRejected = 4,
    BulkheadRejected = 5,
    BadRequest = 6,
}

pub(crate) const KIND_COUNT: usize = 7;

impl EventKind {
    /// Every tracked kind, in counter-slot order.
    pub const ALL: [EventKind; KIND_COUNT] = [
        EventKind::Success,
        EventKind::Failure,
        EventKind::ShortCircuited,
        EventKind::Timeout,
        EventKind::ThreadPoolRejected,
        EventKind::BulkheadRejected,
        EventKind::BadRequest,
    ];
}

/// Start stamp held while a bucket is being moved to a new epoch.
///
/// Writers that lose the reinitialization race spin until the winner
/// publishes the new stamp; readers skip the bucket entirely. This keeps
/// counts from two epochs from ever being mixed in one bucket.
const RESEEDING: u64 = u64::MAX;

struct Bucket {
    start: AtomicU64,
    counts: [AtomicU64; KIND_COUNT],
}

impl Bucket {
    fn new() -> Self {
        Self {
            start: AtomicU64::new(0),
            counts: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }
}

/// A rolling count of discrete events over a bounded trailing window.
pub struct RollingCounter {
    buckets: Box<[Bucket]>,
    bucket_millis: u64,
    window_millis: u64,
    clock: Arc<dyn Clock>,
}

impl RollingCounter {
    pub(crate) const DEFAULT_WINDOW_MILLIS: u64 = 10_000;
    pub(crate) const DEFAULT_BUCKET_COUNT: usize = 10;

    /// Creates a counter with `bucket_count` buckets spanning
    /// `window_millis`.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is zero or does not divide the window
    /// evenly; that is a configuration bug at the call site.
    pub fn new(window_millis: u64, bucket_count: usize, clock: Arc<dyn Clock>) -> Self {
        assert!(bucket_count > 0, "bucket_count must be positive");
        assert!(
            window_millis > 0 && window_millis % bucket_count as u64 == 0,
            "window must be a positive multiple of bucket_count"
        );
        Self {
            buckets: (0..bucket_count).map(|_| Bucket::new()).collect(),
            bucket_millis: window_millis / bucket_count as u64,
            window_millis,
            clock,
        }
    }

    /// Counter with the default 10-second window over 10 buckets.
    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            Self::DEFAULT_WINDOW_MILLIS,
            Self::DEFAULT_BUCKET_COUNT,
            clock,
        )
    }

    /// Records one event of `kind` at the current clock reading.
    pub fn increment(&self, kind: EventKind) {
        let now = self.clock.now_millis();
        let epoch = now - now % self.bucket_millis;
        let bucket = &self.buckets[(now / self.bucket_millis) as usize % self.buckets.len()];

        loop {
            let seen = bucket.start.load(Ordering::Acquire);
            if seen == epoch {
                break;
            }
            if seen == RESEEDING {
                std::hint::spin_loop();
                continue;
            }
            // Stale epoch: claim the bucket, zero it, publish the new stamp.
            if bucket
                .start
                .compare_exchange(seen, RESEEDING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                for count in &bucket.counts {
                    count.store(0, Ordering::Relaxed);
                }
                bucket.start.store(epoch, Ordering::Release);
                break;
            }
        }

        bucket.counts[kind as usize].fetch_add(1, Ordering::Relaxed);
    }

    /// Total events of `kind` across buckets whose start stamp lies
    /// within the trailing window.
    pub fn count(&self, kind: EventKind) -> u64 {
        let now = self.clock.now_millis();
        let mut total = 0;
        for bucket in self.buckets.iter() {
            let start = bucket.start.load(Ordering::Acquire);
            if start == RESEEDING || start > now {
                continue;
            }
            if now - start < self.window_millis {
                total += bucket.counts[kind as usize].load(Ordering::Relaxed);
            }
        }
        total
    }

    /// Zeroes every bucket. Used when a breaker closes so the next
    /// window starts clean.
    pub fn reset(&self) {
        for bucket in self.buckets.iter() {
            loop {
                let seen = bucket.start.load(Ordering::Acquire);
                if seen == RESEEDING {
                    std::hint::spin_loop();
                    continue;
                }
                if bucket
                    .start
                    .compare_exchange(seen, RESEEDING, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
                {
                    for count in &bucket.counts {
                        count.store(0, Ordering::Relaxed);
                    }
                    bucket.start.store(0, Ordering::Release);
                    break;
                }
            }
        }
    }

    /// The trailing window this counter covers, in milliseconds.
    pub fn window_millis(&self) -> u64 {
        self.window_millis
    }
}

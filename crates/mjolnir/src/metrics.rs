//! Health metrics facade over the rolling counter.

use crate::counter::{EventKind, RollingCounter};
use mjolnir_core::Clock;
use std::sync::Arc;

/// Error kinds that count against a breaker's error percentage.
///
/// Short-circuits are load shedding by the breaker itself and bad
/// requests are caller mistakes; neither says anything about downstream
/// health, so both stay out of the rate (and out of the denominator).
const ERROR_KINDS: [EventKind; 4] = [
    EventKind::Failure,
    EventKind::Timeout,
    EventKind::ThreadPoolRejected,
    EventKind::BulkheadRejected,
];

const OPERATION_KINDS: [EventKind; 5] = [
    EventKind::Success,
    EventKind::Failure,
    EventKind::Timeout,
    EventKind::ThreadPoolRejected,
    EventKind::BulkheadRejected,
];

/// Rolling-window health view for one breaker key.
pub struct CommandMetrics {
    counter: RollingCounter,
}

impl CommandMetrics {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            counter: RollingCounter::with_defaults(clock),
        }
    }

    /// Total operations observed in the window.
    pub fn total(&self) -> u64 {
        OPERATION_KINDS
            .iter()
            .map(|kind| self.counter.count(*kind))
            .sum()
    }

    /// Errors as a rounded percentage of total operations; 0 when the
    /// window is empty.
    pub fn error_percent(&self) -> u64 {
        let total = self.total();
        if total == 0 {
            return 0;
        }
        let errors: u64 = ERROR_KINDS
            .iter()
            .map(|kind| self.counter.count(*kind))
            .sum();
        (100 * errors + total / 2) / total
    }

    /// Count of one event kind in the window.
    pub fn count(&self, kind: EventKind) -> u64 {
        self.counter.count(kind)
    }

    pub fn mark_command_success(&self) {
        self.counter.increment(EventKind::Success);
    }

    pub fn mark_command_failure(&self) {
        self.counter.increment(EventKind::Failure);
    }

    pub fn mark_command_timeout(&self) {
        self.counter.increment(EventKind::Timeout);
    }

    pub fn mark_short_circuited(&self) {
        self.counter.increment(EventKind::ShortCircuited);
    }

    pub fn mark_thread_pool_rejected(&self) {
        self.counter.increment(EventKind::ThreadPoolRejected);
    }

    pub fn mark_bulkhead_rejected(&self) {
        self.counter.increment(EventKind::BulkheadRejected);
    }

    pub fn mark_bad_request(&self) {
        self.counter.increment(EventKind::BadRequest);
    }

    pub(crate) fn reset(&self) {
        self.counter.reset();
    }
}

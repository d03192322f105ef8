//! Error-rate circuit breaker.
//!
//! Three states: `Closed` admits everything, `Open` rejects everything
//! until the cooldown elapses, `HalfOpen` admits exactly one probe whose
//! outcome decides what happens next. All settings are re-read from the
//! configuration provider on every decision, so operators can retune or
//! force a breaker without restarting the process.

use crate::config::{keys, ConfigProvider};
use crate::events::BreakerEvent;
use crate::metrics::CommandMetrics;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use mjolnir_core::{Clock, EventListeners, GroupKey};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakerState {
    /// Calls flow; the window is being watched.
    Closed = 0,
    /// Calls are rejected until the cooldown elapses.
    Open = 1,
    /// One probe call is in flight; everyone else is rejected.
    HalfOpen = 2,
}

impl BreakerState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => BreakerState::Open,
            2 => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    fn name(self) -> &'static str {
        match self {
            BreakerState::Closed => "Closed",
            BreakerState::Open => "Open",
            BreakerState::HalfOpen => "HalfOpen",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Point-in-time view of a breaker for dashboards and logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub total: u64,
    pub error_percent: u64,
}

pub(crate) const DEFAULT_MINIMUM_OPERATIONS: u64 = 10;
pub(crate) const DEFAULT_THRESHOLD_PERCENT: u64 = 50;
pub(crate) const DEFAULT_TRIPPED_DURATION_MILLIS: u64 = 10_000;

/// Error-rate gate for one breaker key.
pub struct CircuitBreaker {
    key: GroupKey,
    state: AtomicU8,
    /// Clock reading when the breaker last entered `Open`. Written before
    /// the state flip that publishes it.
    opened_at: AtomicU64,
    metrics: CommandMetrics,
    config: Arc<dyn ConfigProvider>,
    clock: Arc<dyn Clock>,
    listeners: EventListeners<BreakerEvent>,
}

impl CircuitBreaker {
    pub(crate) fn new(
        key: GroupKey,
        config: Arc<dyn ConfigProvider>,
        clock: Arc<dyn Clock>,
        listeners: EventListeners<BreakerEvent>,
    ) -> Self {
        Self {
            key,
            state: AtomicU8::new(BreakerState::Closed as u8),
            opened_at: AtomicU64::new(0),
            metrics: CommandMetrics::new(Arc::clone(&clock)),
            config,
            clock,
            listeners,
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// The rolling-window health view backing this breaker.
    pub fn metrics(&self) -> &CommandMetrics {
        &self.metrics
    }

    /// Current state. Safe from any thread, never blocks.
    pub fn state(&self) -> BreakerState {
        BreakerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Point-in-time view of state and window health.
    pub fn snapshot(&self) -> BreakerSnapshot {
        BreakerSnapshot {
            state: self.state(),
            total: self.metrics.total(),
            error_percent: self.metrics.error_percent(),
        }
    }

    fn setting(&self, prop: &str, default: u64) -> u64 {
        self.config
            .get_u64(&keys::breaker(&self.key, prop))
            .unwrap_or(default)
    }

    fn flag(&self, prop: &str) -> bool {
        self.config
            .get_bool(&keys::breaker(&self.key, prop))
            .unwrap_or(false)
    }

    /// Returns true iff the caller may proceed.
    ///
    /// Never mutates the health metrics; the only side effects are the
    /// state transitions themselves. Operator overrides take precedence:
    /// `forceFixed` beats `forceTripped` beats the dynamic state.
    pub fn is_allowing(&self) -> bool {
        let allowed = if self.flag("forceFixed") {
            true
        } else if self.flag("forceTripped") {
            false
        } else {
            self.evaluate()
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(breaker = %self.key, allowed, "breaker admission");

        let event = if allowed {
            BreakerEvent::CallPermitted {
                key: self.key.clone(),
                timestamp: Instant::now(),
                state: self.state(),
            }
        } else {
            BreakerEvent::CallRejected {
                key: self.key.clone(),
                timestamp: Instant::now(),
                state: self.state(),
            }
        };
        self.listeners.emit(&event);

        allowed
    }

    fn evaluate(&self) -> bool {
        match self.state() {
            BreakerState::Closed => {
                let minimum = self.setting("minimumOperations", DEFAULT_MINIMUM_OPERATIONS);
                let threshold = self.setting("thresholdPercent", DEFAULT_THRESHOLD_PERCENT);
                if self.metrics.total() >= minimum && self.metrics.error_percent() >= threshold {
                    // Whether this thread wins the trip race or loses it
                    // to a peer, the window is unhealthy and the call is
                    // rejected.
                    self.opened_at.store(self.clock.now_millis(), Ordering::Release);
                    self.transition(BreakerState::Closed, BreakerState::Open);
                    false
                } else {
                    true
                }
            }
            BreakerState::Open => {
                let cooldown =
                    self.setting("trippedDurationMillis", DEFAULT_TRIPPED_DURATION_MILLIS);
                let opened_at = self.opened_at.load(Ordering::Acquire);
                if self.clock.now_millis().saturating_sub(opened_at) >= cooldown {
                    // The CAS inside transition grants the probe slot to
                    // exactly one caller.
                    self.transition(BreakerState::Open, BreakerState::HalfOpen)
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => false,
        }
    }

    /// Reports a successful body execution.
    ///
    /// A successful probe closes the breaker and wipes the window so the
    /// next evaluation starts clean.
    pub fn mark_success(&self, elapsed: Duration) {
        #[cfg(not(feature = "tracing"))]
        let _ = elapsed;
        if self.state() == BreakerState::HalfOpen
            && self.transition(BreakerState::HalfOpen, BreakerState::Closed)
        {
            self.metrics.reset();
            #[cfg(feature = "tracing")]
            tracing::debug!(breaker = %self.key, ?elapsed, "probe succeeded, breaker fixed");
        }
    }

    /// Reports a failed body execution.
    ///
    /// A failed probe re-opens the breaker with a fresh cooldown.
    /// Failures in the closed state only feed the window; the trip
    /// decision is made at the next admission check.
    pub fn mark_failure(&self) {
        self.release_probe();
    }

    /// Gives the probe slot back without a verdict.
    ///
    /// A probe that ends in caller cancellation, or is shed by a nested
    /// command, neither fixes nor faults the dependency. The slot must
    /// still be released — `HalfOpen` has no other exit — so the breaker
    /// returns to `Open` with a fresh cooldown and a later call can
    /// probe again. No error metric is recorded.
    pub fn release_probe(&self) {
        if self.state() == BreakerState::HalfOpen {
            self.opened_at.store(self.clock.now_millis(), Ordering::Release);
            self.transition(BreakerState::HalfOpen, BreakerState::Open);
        }
    }

    /// CAS transition; returns whether this caller performed it.
    fn transition(&self, from: BreakerState, to: BreakerState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !moved {
            return false;
        }

        #[cfg(feature = "tracing")]
        tracing::info!(breaker = %self.key, from = from.name(), to = to.name(), "breaker state transition");

        #[cfg(feature = "metrics")]
        {
            counter!(
                "mjolnir_breaker_transitions_total",
                "breaker" => self.key.to_string(),
                "from" => from.name(),
                "to" => to.name()
            )
            .increment(1);
            gauge!("mjolnir_breaker_state", "breaker" => self.key.to_string()).set(to as u8 as f64);
        }

        self.listeners.emit(&BreakerEvent::StateTransition {
            key: self.key.clone(),
            timestamp: Instant::now(),
            from,
            to,
        });

        true
    }
}

//! Events emitted by breakers and bulkheads.

use crate::breaker::BreakerState;
use mjolnir_core::{GroupKey, MjolnirEvent};
use std::time::{Duration, Instant};

/// Events emitted by a circuit breaker.
#[derive(Debug, Clone)]
pub enum BreakerEvent {
    /// The breaker moved between states.
    StateTransition {
        key: GroupKey,
        timestamp: Instant,
        from: BreakerState,
        to: BreakerState,
    },
    /// An admission check let the call through.
    CallPermitted {
        key: GroupKey,
        timestamp: Instant,
        state: BreakerState,
    },
    /// An admission check rejected the call.
    CallRejected {
        key: GroupKey,
        timestamp: Instant,
        state: BreakerState,
    },
}

impl MjolnirEvent for BreakerEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::StateTransition { .. } => "state_transition",
            Self::CallPermitted { .. } => "call_permitted",
            Self::CallRejected { .. } => "call_rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Self::StateTransition { timestamp, .. }
            | Self::CallPermitted { timestamp, .. }
            | Self::CallRejected { timestamp, .. } => *timestamp,
        }
    }

    fn key(&self) -> &GroupKey {
        match self {
            Self::StateTransition { key, .. }
            | Self::CallPermitted { key, .. }
            | Self::CallRejected { key, .. } => key,
        }
    }
}

/// Events emitted by a bulkhead.
#[derive(Debug, Clone)]
pub enum BulkheadEvent {
    /// A permit was acquired.
    Permitted {
        key: GroupKey,
        timestamp: Instant,
        /// Concurrent holders after this acquisition.
        active: usize,
    },
    /// Admission was refused (no permits, or the queue was full).
    Rejected {
        key: GroupKey,
        timestamp: Instant,
        max_concurrent: usize,
    },
    /// A permit was returned.
    Released {
        key: GroupKey,
        timestamp: Instant,
        /// How long the permit was held.
        held: Duration,
    },
}

impl MjolnirEvent for BulkheadEvent {
    fn kind(&self) -> &'static str {
        match self {
            Self::Permitted { .. } => "permitted",
            Self::Rejected { .. } => "rejected",
            Self::Released { .. } => "released",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Self::Permitted { timestamp, .. }
            | Self::Rejected { timestamp, .. }
            | Self::Released { timestamp, .. } => *timestamp,
        }
    }

    fn key(&self) -> &GroupKey {
        match self {
            Self::Permitted { key, .. } | Self::Rejected { key, .. } | Self::Released { key, .. } => {
                key
            }
        }
    }
}

//! Core infrastructure for mjolnir.
//!
//! This crate provides shared functionality used across the mjolnir
//! workspace:
//! - Interned [`GroupKey`] identifiers naming dependency clusters
//! - A monotonic [`Clock`] abstraction (wall-clock changes never leak in)
//! - An event system for observability
//! - The [`MetricsSink`] surface consumed by downstream stats pipelines
//!
//! ## Feature Flags
//! - `tracing`: enables the [`TracingSink`] implementation

pub mod clock;
pub mod events;
pub mod key;
pub mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventListener, EventListeners, FnListener, MjolnirEvent};
pub use key::GroupKey;
#[cfg(feature = "tracing")]
pub use sink::TracingSink;
pub use sink::{MetricsSink, NullSink};

//! Metrics sink surface.
//!
//! The core publishes observations as `(service, status, value)` events,
//! where `service` is a stable string such as
//! `mjolnir command my-api.FetchUser execute` or
//! `mjolnir breaker my-api total`. Downstream consumers parse these into
//! (timestamp, service, state, numeric value) tuples; there is no
//! ordering guarantee across services.

/// Receives metric events from the invocation core.
pub trait MetricsSink: Send + Sync + 'static {
    /// Records one observation.
    ///
    /// `value` is an elapsed-milliseconds measurement for command
    /// executions and the gauge reading for periodic gauges; admission
    /// decisions carry no value.
    fn event(&self, service: &str, status: &str, value: Option<i64>);
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn event(&self, _service: &str, _status: &str, _value: Option<i64>) {}
}

/// A sink that logs each event at debug level through `tracing`.
#[cfg(feature = "tracing")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[cfg(feature = "tracing")]
impl MetricsSink for TracingSink {
    fn event(&self, service: &str, status: &str, value: Option<i64>) {
        match value {
            Some(value) => tracing::debug!(service, status, value, "metric"),
            None => tracing::debug!(service, status, "metric"),
        }
    }
}

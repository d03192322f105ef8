//! The runtime: configuration, sinks, and per-key singletons.
//!
//! A [`Mjolnir`] value is constructed once at program start and threaded
//! through to every invocation site. Breakers, bulkheads, and fallback
//! gates are created lazily on first reference to a key and live as
//! long as the runtime; they are never removed.

use crate::breaker::CircuitBreaker;
use crate::bulkhead::{Bulkhead, BulkheadVariant};
use crate::config::{keys, ConfigProvider, MemoryConfig};
use crate::events::{BreakerEvent, BulkheadEvent};
use crate::fallback::FallbackGate;
use mjolnir_core::{
    Clock, EventListeners, FnListener, GroupKey, MetricsSink, NullSink, SystemClock,
};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// The process-level entry point: owns the configuration provider, the
/// metrics sink, the clock, and the registries of per-key singletons.
pub struct Mjolnir {
    config: Arc<dyn ConfigProvider>,
    sink: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    breaker_listeners: EventListeners<BreakerEvent>,
    bulkhead_listeners: EventListeners<BulkheadEvent>,
    breakers: RwLock<HashMap<GroupKey, Arc<CircuitBreaker>>>,
    bulkheads: RwLock<HashMap<GroupKey, Arc<Bulkhead>>>,
    gates: RwLock<HashMap<GroupKey, Arc<FallbackGate>>>,
    blocking_runtime: OnceLock<tokio::runtime::Runtime>,
}

impl Mjolnir {
    /// Returns a builder for a runtime.
    pub fn builder() -> MjolnirBuilder {
        MjolnirBuilder::new()
    }

    /// A runtime with an empty in-memory config, a null sink, and the
    /// system clock.
    pub fn with_defaults() -> Self {
        Self::builder().build()
    }

    pub fn config(&self) -> &Arc<dyn ConfigProvider> {
        &self.config
    }

    pub(crate) fn sink(&self) -> &Arc<dyn MetricsSink> {
        &self.sink
    }

    /// The singleton breaker for `key`, created on first reference.
    pub fn breaker(&self, key: &GroupKey) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(breaker);
        }
        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(breakers.entry(key.clone()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                key.clone(),
                Arc::clone(&self.config),
                Arc::clone(&self.clock),
                self.breaker_listeners.clone(),
            ))
        }))
    }

    /// The singleton bulkhead for `key`, created on first reference.
    ///
    /// A key configured with `mjolnir.pools.<key>.queueLength` at first
    /// reference gets the queued variant; everything else gets the
    /// semaphore variant.
    pub fn bulkhead(&self, key: &GroupKey) -> Arc<Bulkhead> {
        if let Some(bulkhead) = self
            .bulkheads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(bulkhead);
        }
        let mut bulkheads = self
            .bulkheads
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(bulkheads.entry(key.clone()).or_insert_with(|| {
            let variant = if self
                .config
                .get_u64(&keys::pool(key, "queueLength"))
                .is_some()
            {
                BulkheadVariant::Queued
            } else {
                BulkheadVariant::Semaphore
            };
            Arc::new(Bulkhead::new(
                key.clone(),
                variant,
                Arc::clone(&self.config),
                self.bulkhead_listeners.clone(),
            ))
        }))
    }

    /// The singleton fallback gate for `key`, created on first reference.
    pub fn fallback_gate(&self, key: &GroupKey) -> Arc<FallbackGate> {
        if let Some(gate) = self
            .gates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(gate);
        }
        let mut gates = self.gates.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(gates.entry(key.clone()).or_insert_with(|| {
            Arc::new(FallbackGate::new(key.clone(), Arc::clone(&self.config)))
        }))
    }

    pub(crate) fn known_breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub(crate) fn known_bulkheads(&self) -> Vec<Arc<Bulkhead>> {
        self.bulkheads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub(crate) fn fallback_runtime(&self) -> &tokio::runtime::Runtime {
        self.blocking_runtime.get_or_init(|| {
            tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .expect("failed to build blocking-invoke runtime")
        })
    }
}

/// Builder for a [`Mjolnir`] runtime.
pub struct MjolnirBuilder {
    config: Arc<dyn ConfigProvider>,
    sink: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
    breaker_listeners: EventListeners<BreakerEvent>,
    bulkhead_listeners: EventListeners<BulkheadEvent>,
}

impl MjolnirBuilder {
    fn new() -> Self {
        Self {
            config: Arc::new(MemoryConfig::new()),
            sink: Arc::new(NullSink),
            clock: Arc::new(SystemClock::new()),
            breaker_listeners: EventListeners::new(),
            bulkhead_listeners: EventListeners::new(),
        }
    }

    /// Sets the configuration provider.
    ///
    /// Default: an empty [`MemoryConfig`] (built-in defaults everywhere).
    pub fn config(mut self, config: Arc<dyn ConfigProvider>) -> Self {
        self.config = config;
        self
    }

    /// Sets the metrics sink.
    ///
    /// Default: [`NullSink`].
    pub fn sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the monotonic clock. Mostly useful in tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers a listener over every breaker's events.
    pub fn on_breaker_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&BreakerEvent) + Send + Sync + 'static,
    {
        self.breaker_listeners.add(FnListener::new(f));
        self
    }

    /// Registers a callback fired on every breaker state transition.
    pub fn on_breaker_transition<F>(self, f: F) -> Self
    where
        F: Fn(&GroupKey, crate::BreakerState, crate::BreakerState) + Send + Sync + 'static,
    {
        self.on_breaker_event(move |event| {
            if let BreakerEvent::StateTransition { key, from, to, .. } = event {
                f(key, *from, *to);
            }
        })
    }

    /// Registers a listener over every bulkhead's events.
    pub fn on_bulkhead_event<F>(mut self, f: F) -> Self
    where
        F: Fn(&BulkheadEvent) + Send + Sync + 'static,
    {
        self.bulkhead_listeners.add(FnListener::new(f));
        self
    }

    pub fn build(self) -> Mjolnir {
        Mjolnir {
            config: self.config,
            sink: self.sink,
            clock: self.clock,
            breaker_listeners: self.breaker_listeners,
            bulkhead_listeners: self.bulkhead_listeners,
            breakers: RwLock::new(HashMap::new()),
            bulkheads: RwLock::new(HashMap::new()),
            gates: RwLock::new(HashMap::new()),
            blocking_runtime: OnceLock::new(),
        }
    }
}

impl Default for MjolnirBuilder {
    fn default() -> Self {
        Self::new()
    }
}

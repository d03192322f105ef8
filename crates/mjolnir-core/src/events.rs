//! Event system for breaker and bulkhead observability.
//!
//! Components emit typed events; callers register listeners on the
//! runtime builder. Listeners are fire-and-forget: a panicking listener
//! is isolated so the remaining listeners still run.

use crate::key::GroupKey;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait implemented by every event a mjolnir component emits.
pub trait MjolnirEvent: Send + Sync + fmt::Debug {
    /// Short machine-readable event kind (e.g. "state_transition").
    fn kind(&self) -> &'static str;

    /// When the event occurred.
    fn timestamp(&self) -> Instant;

    /// The group key of the component that emitted the event.
    fn key(&self) -> &GroupKey;
}

/// Trait for observing events of a given type.
pub trait EventListener<E: MjolnirEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// A collection of listeners sharing an event type.
pub struct EventListeners<E: MjolnirEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: MjolnirEvent> Clone for EventListeners<E> {
    fn clone(&self) -> Self {
        Self {
            listeners: self.listeners.clone(),
        }
    }
}

impl<E: MjolnirEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Adds a listener.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits `event` to every registered listener.
    ///
    /// A panic in one listener does not prevent the others from running.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: MjolnirEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A closure-based listener.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _marker: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: MjolnirEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}

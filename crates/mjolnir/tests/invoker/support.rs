//! Shared helpers for the invoker tests.

use mjolnir::{BoxError, CommandDescriptor, FnCommand, Mjolnir};
use mjolnir_core::MetricsSink;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A sink that records every event for later assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, String, Option<i64>)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<(String, String, Option<i64>)> {
        self.events.lock().expect("sink lock").clone()
    }

    pub fn contains(&self, service: &str, status: &str) -> bool {
        self.events()
            .iter()
            .any(|(s, st, _)| s == service && st == status)
    }
}

impl MetricsSink for RecordingSink {
    fn event(&self, service: &str, status: &str, value: Option<i64>) {
        self.events
            .lock()
            .expect("sink lock")
            .push((service.to_string(), status.to_string(), value));
    }
}

/// Tracks whether a command body actually ran.
#[derive(Clone, Default)]
pub struct BodyProbe(Arc<AtomicBool>);

impl BodyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn ran(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn descriptor(group: &str) -> CommandDescriptor {
    CommandDescriptor::named("NoOp", group, Duration::from_millis(500))
}

/// A command whose body immediately returns `Ok(true)`.
pub fn succeeding_command(group: &str, probe: BodyProbe) -> FnCommand<bool> {
    FnCommand::new(descriptor(group), move |_token| async move {
        probe.mark();
        Ok(true)
    })
}

/// A command whose body immediately fails.
pub fn failing_command(group: &str) -> FnCommand<bool> {
    FnCommand::new(descriptor(group), |_token| async {
        Err(BoxError::from("downstream failed"))
    })
}

pub fn runtime_with_sink(sink: Arc<RecordingSink>) -> Mjolnir {
    Mjolnir::builder().sink(sink).build()
}

//! Periodic gauge publication.
//!
//! Every `mjolnir.gaugeIntervalMillis` the runtime pushes a reading for
//! each breaker (`total`, `error`) and each bulkhead (`activeThreads`)
//! it has created so far. The interval is re-read every cycle, so
//! retuning it takes effect without a restart.

use crate::config::keys;
use crate::runtime::Mjolnir;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub(crate) const DEFAULT_GAUGE_INTERVAL_MILLIS: u64 = 5_000;

impl Mjolnir {
    /// Spawns the gauge publisher on the current tokio runtime.
    ///
    /// The task runs until aborted; dropping the runtime that spawned it
    /// stops it with everything else.
    pub fn spawn_gauge_publisher(self: &Arc<Self>) -> JoinHandle<()> {
        let runtime = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let interval = runtime
                    .config()
                    .get_u64(keys::GAUGE_INTERVAL_MILLIS)
                    .unwrap_or(DEFAULT_GAUGE_INTERVAL_MILLIS);
                tokio::time::sleep(Duration::from_millis(interval)).await;
                runtime.publish_gauges();
            }
        })
    }

    /// Pushes one reading for every known breaker and bulkhead.
    pub fn publish_gauges(&self) {
        for breaker in self.known_breakers() {
            let snapshot = breaker.snapshot();
            self.sink().event(
                &format!("mjolnir breaker {} total", breaker.key()),
                "Gauge",
                Some(snapshot.total as i64),
            );
            self.sink().event(
                &format!("mjolnir breaker {} error", breaker.key()),
                "Gauge",
                Some(snapshot.error_percent as i64),
            );
        }
        for bulkhead in self.known_bulkheads() {
            self.sink().event(
                &format!("mjolnir pool {} activeThreads", bulkhead.key()),
                "Gauge",
                Some(bulkhead.active_count() as i64),
            );

            #[cfg(feature = "metrics")]
            metrics::gauge!(
                "mjolnir_pool_active_threads",
                "pool" => bulkhead.key().to_string()
            )
            .set(bulkhead.active_count() as f64);
        }
    }
}

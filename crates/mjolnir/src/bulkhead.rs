//! Concurrency-capped admission per dependency group.
//!
//! Two variants share one type. The semaphore variant (the default)
//! answers immediately: a permit or a rejection. The queued variant
//! models a worker pool: `threadCount` execution slots plus a bounded
//! queue; a call that finds the queue full is rejected immediately,
//! a call that wins a queue slot waits for an execution slot as part of
//! its execution phase.
//!
//! Capacity is re-read from configuration on every admission; when
//! `threadCount` changes, a fresh semaphore is swapped in atomically and
//! permits on the old one drain as their holders finish.

use crate::config::{keys, ConfigProvider};
use crate::events::BulkheadEvent;
#[cfg(feature = "metrics")]
use metrics::{counter, gauge};
use mjolnir_core::{EventListeners, GroupKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub(crate) const DEFAULT_MAX_CONCURRENT: u64 = 10;
pub(crate) const DEFAULT_QUEUE_LENGTH: u64 = 10;

/// How a bulkhead key isolates its callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkheadVariant {
    /// Fixed permit count, immediate accept/reject.
    Semaphore,
    /// Fixed execution slots plus a bounded admission queue.
    Queued,
}

/// Admission refused by a bulkhead.
#[derive(Debug, Clone, Error)]
pub enum BulkheadRejection {
    /// No permits available (semaphore variant).
    #[error("bulkhead {key} rejected the call: all {max_concurrent} permits in use")]
    Saturated { key: GroupKey, max_concurrent: usize },

    /// The admission queue is full (queued variant).
    #[error("pool {key} rejected the call: queue full at depth {queue_length}")]
    QueueFull { key: GroupKey, queue_length: usize },
}

struct Core {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

impl Core {
    fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }
}

/// Fixed-capacity admission controller for one bulkhead key.
pub struct Bulkhead {
    key: GroupKey,
    variant: BulkheadVariant,
    core: RwLock<Arc<Core>>,
    /// Depth of the admission queue (queued variant only).
    queued: AtomicUsize,
    config: Arc<dyn ConfigProvider>,
    listeners: EventListeners<BulkheadEvent>,
}

/// A held execution slot. Dropping it releases the slot; permits are
/// released on every exit path, panics included.
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
    key: GroupKey,
    listeners: EventListeners<BulkheadEvent>,
    acquired: Instant,
}

/// A claimed admission-queue slot (queued variant). Released on drop, so
/// a caller that abandons `admit` while parked cannot inflate the queue
/// depth.
struct QueueSlot<'a> {
    queued: &'a AtomicUsize,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        self.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        self.listeners.emit(&BulkheadEvent::Released {
            key: self.key.clone(),
            timestamp: Instant::now(),
            held: self.acquired.elapsed(),
        });
    }
}

impl Bulkhead {
    pub(crate) fn new(
        key: GroupKey,
        variant: BulkheadVariant,
        config: Arc<dyn ConfigProvider>,
        listeners: EventListeners<BulkheadEvent>,
    ) -> Self {
        let max = config
            .get_u64(&keys::pool(&key, "threadCount"))
            .unwrap_or(DEFAULT_MAX_CONCURRENT) as usize;
        Self {
            key,
            variant,
            core: RwLock::new(Arc::new(Core::new(max))),
            queued: AtomicUsize::new(0),
            config,
            listeners,
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn variant(&self) -> BulkheadVariant {
        self.variant
    }

    /// Permits currently held.
    pub fn active_count(&self) -> usize {
        let core = self.current_core();
        core.max_concurrent - core.semaphore.available_permits().min(core.max_concurrent)
    }

    /// Configured capacity as of the last admission.
    pub fn max_concurrent(&self) -> usize {
        self.current_core().max_concurrent
    }

    fn current_core(&self) -> Arc<Core> {
        Arc::clone(&self.core.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Re-reads capacity from config and swaps in a new semaphore when
    /// it changed. Holders of permits on the old semaphore are
    /// unaffected and drain naturally.
    fn refreshed_core(&self) -> Arc<Core> {
        let desired = self
            .config
            .get_u64(&keys::pool(&self.key, "threadCount"))
            .unwrap_or(DEFAULT_MAX_CONCURRENT) as usize;

        {
            let core = self.core.read().unwrap_or_else(PoisonError::into_inner);
            if core.max_concurrent == desired {
                return Arc::clone(&core);
            }
        }

        let mut core = self.core.write().unwrap_or_else(PoisonError::into_inner);
        if core.max_concurrent != desired {
            #[cfg(feature = "tracing")]
            tracing::info!(
                bulkhead = %self.key,
                from = core.max_concurrent,
                to = desired,
                "bulkhead capacity changed"
            );
            *core = Arc::new(Core::new(desired));
        }
        Arc::clone(&core)
    }

    /// Non-blocking acquisition. The semaphore variant's only admission
    /// path, and the fast path of the queued variant.
    pub fn try_acquire(&self) -> Result<BulkheadPermit, BulkheadRejection> {
        let core = self.refreshed_core();
        match Arc::clone(&core.semaphore).try_acquire_owned() {
            Ok(permit) => Ok(self.admitted(permit, &core)),
            Err(_) => Err(self.rejected(&core)),
        }
    }

    /// Admission for the invoker: immediate for the semaphore variant;
    /// for the queued variant a queue slot is claimed immediately (or
    /// the call is rejected immediately) and the wait for an execution
    /// slot happens here, as part of the execution phase.
    pub async fn admit(&self) -> Result<BulkheadPermit, BulkheadRejection> {
        match self.variant {
            BulkheadVariant::Semaphore => self.try_acquire(),
            BulkheadVariant::Queued => {
                let core = self.refreshed_core();
                if let Ok(permit) = Arc::clone(&core.semaphore).try_acquire_owned() {
                    return Ok(self.admitted(permit, &core));
                }

                let queue_length = self
                    .config
                    .get_u64(&keys::pool(&self.key, "queueLength"))
                    .unwrap_or(DEFAULT_QUEUE_LENGTH) as usize;

                let mut depth = self.queued.load(Ordering::Relaxed);
                loop {
                    if depth >= queue_length {
                        self.emit_rejected(&core);
                        return Err(BulkheadRejection::QueueFull {
                            key: self.key.clone(),
                            queue_length,
                        });
                    }
                    match self.queued.compare_exchange(
                        depth,
                        depth + 1,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(current) => depth = current,
                    }
                }

                // Leaves the queue on every exit path, including a
                // caller dropping this future while parked.
                let _slot = QueueSlot {
                    queued: &self.queued,
                };
                let acquired = Arc::clone(&core.semaphore).acquire_owned().await;
                match acquired {
                    Ok(permit) => Ok(self.admitted(permit, &core)),
                    // The semaphore is never closed while the bulkhead
                    // lives; treat it as saturation rather than panic.
                    Err(_) => Err(self.rejected(&core)),
                }
            }
        }
    }

    fn admitted(&self, permit: OwnedSemaphorePermit, core: &Core) -> BulkheadPermit {
        let active = core.max_concurrent - core.semaphore.available_permits().min(core.max_concurrent);
        self.listeners.emit(&BulkheadEvent::Permitted {
            key: self.key.clone(),
            timestamp: Instant::now(),
            active,
        });

        #[cfg(feature = "metrics")]
        {
            counter!("mjolnir_bulkhead_permitted_total", "bulkhead" => self.key.to_string())
                .increment(1);
            gauge!("mjolnir_bulkhead_active", "bulkhead" => self.key.to_string())
                .set(active as f64);
        }

        BulkheadPermit {
            _permit: permit,
            key: self.key.clone(),
            listeners: self.listeners.clone(),
            acquired: Instant::now(),
        }
    }

    fn rejected(&self, core: &Core) -> BulkheadRejection {
        self.emit_rejected(core);
        BulkheadRejection::Saturated {
            key: self.key.clone(),
            max_concurrent: core.max_concurrent,
        }
    }

    fn emit_rejected(&self, core: &Core) {
        self.listeners.emit(&BulkheadEvent::Rejected {
            key: self.key.clone(),
            timestamp: Instant::now(),
            max_concurrent: core.max_concurrent,
        });

        #[cfg(feature = "metrics")]
        counter!("mjolnir_bulkhead_rejected_total", "bulkhead" => self.key.to_string())
            .increment(1);
    }
}

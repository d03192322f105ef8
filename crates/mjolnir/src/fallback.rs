//! Fallback gate: a small semaphore bounding concurrent fallbacks.
//!
//! Fallbacks run when the primary path is already in trouble, which is
//! exactly when a stampede of them can finish off the process. The gate
//! caps how many run at once per group; a rejected fallback surfaces the
//! original failure.

use crate::config::{keys, ConfigProvider};
use mjolnir_core::GroupKey;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

pub(crate) const DEFAULT_FALLBACK_MAX_CONCURRENT: u64 = 10;

struct Core {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
}

/// Concurrency cap on fallback execution for one group key.
pub struct FallbackGate {
    key: GroupKey,
    core: RwLock<Arc<Core>>,
    config: Arc<dyn ConfigProvider>,
}

/// A held fallback slot; dropping it releases the slot.
pub struct FallbackPermit {
    _permit: OwnedSemaphorePermit,
}

impl FallbackGate {
    pub(crate) fn new(key: GroupKey, config: Arc<dyn ConfigProvider>) -> Self {
        let max = config
            .get_u64(&keys::fallback(&key, "maxConcurrent"))
            .unwrap_or(DEFAULT_FALLBACK_MAX_CONCURRENT) as usize;
        Self {
            key,
            core: RwLock::new(Arc::new(Core {
                max_concurrent: max,
                semaphore: Arc::new(Semaphore::new(max)),
            })),
            config,
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    /// Non-blocking; `None` means the gate is full.
    pub fn try_acquire(&self) -> Option<FallbackPermit> {
        let core = self.refreshed_core();
        match Arc::clone(&core.semaphore).try_acquire_owned() {
            Ok(permit) => Some(FallbackPermit { _permit: permit }),
            Err(_) => None,
        }
    }

    fn refreshed_core(&self) -> Arc<Core> {
        let desired = self
            .config
            .get_u64(&keys::fallback(&self.key, "maxConcurrent"))
            .unwrap_or(DEFAULT_FALLBACK_MAX_CONCURRENT) as usize;

        {
            let core = self.core.read().unwrap_or_else(PoisonError::into_inner);
            if core.max_concurrent == desired {
                return Arc::clone(&core);
            }
        }

        let mut core = self.core.write().unwrap_or_else(PoisonError::into_inner);
        if core.max_concurrent != desired {
            *core = Arc::new(Core {
                max_concurrent: desired,
                semaphore: Arc::new(Semaphore::new(desired)),
            });
        }
        Arc::clone(&core)
    }
}

//! Key/value configuration surface.
//!
//! Every breaker, bulkhead, and fallback-gate setting is read through a
//! [`ConfigProvider`] at the moment the decision is made, so a provider
//! whose answers change at runtime changes behavior without a restart.
//! Nothing is cached between invocations.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Recognized configuration key names.
pub mod keys {
    use mjolnir_core::GroupKey;

    /// Master enable for circuit breakers. Default: `true`.
    pub const USE_CIRCUIT_BREAKERS: &str = "mjolnir.useCircuitBreakers";

    /// Global cancellation/timeout bypass. Default: `false`.
    pub const IGNORE_TIMEOUTS: &str = "mjolnir.ignoreTimeouts";

    /// Period for publishing gauge metrics, in milliseconds. Default: `5000`.
    pub const GAUGE_INTERVAL_MILLIS: &str = "mjolnir.gaugeIntervalMillis";

    /// Per-command timeout override (`command.<name>.Timeout`), in milliseconds.
    pub fn command_timeout(name: &str) -> String {
        format!("command.{name}.Timeout")
    }

    /// Breaker setting (`mjolnir.breaker.<key>.<prop>`).
    pub fn breaker(key: &GroupKey, prop: &str) -> String {
        format!("mjolnir.breaker.{key}.{prop}")
    }

    /// Pool/bulkhead setting (`mjolnir.pools.<key>.<prop>`).
    pub fn pool(key: &GroupKey, prop: &str) -> String {
        format!("mjolnir.pools.{key}.{prop}")
    }

    /// Fallback gate setting (`mjolnir.fallback.<key>.<prop>`).
    pub fn fallback(key: &GroupKey, prop: &str) -> String {
        format!("mjolnir.fallback.{key}.{prop}")
    }
}

/// A typed view over string-keyed configuration.
///
/// Implementations are free to back this with files, environment
/// variables, or a live config service; the core only requires that
/// reads reflect the provider's current answer. Absent keys fall back to
/// built-in defaults at the call site.
pub trait ConfigProvider: Send + Sync + 'static {
    fn get_bool(&self, key: &str) -> Option<bool>;

    fn get_u64(&self, key: &str) -> Option<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigValue {
    Bool(bool),
    U64(u64),
}

/// An in-memory provider whose values can be changed at runtime.
///
/// Useful both as the default (empty, everything at built-in defaults)
/// and as a hot-reload vehicle: mutating a value changes the behavior of
/// the next invocation that reads it.
///
/// ```
/// use mjolnir::config::{keys, ConfigProvider, MemoryConfig};
///
/// let config = MemoryConfig::new();
/// assert_eq!(config.get_bool(keys::IGNORE_TIMEOUTS), None);
///
/// config.set_bool(keys::IGNORE_TIMEOUTS, true);
/// assert_eq!(config.get_bool(keys::IGNORE_TIMEOUTS), Some(true));
/// ```
#[derive(Debug, Default)]
pub struct MemoryConfig {
    values: RwLock<HashMap<String, ConfigValue>>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bool(&self, key: impl Into<String>, value: bool) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), ConfigValue::Bool(value));
    }

    pub fn set_u64(&self, key: impl Into<String>, value: u64) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), ConfigValue::U64(value));
    }

    /// Removes a key, restoring the built-in default at its readers.
    pub fn clear(&self, key: &str) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .copied()
    }
}

impl ConfigProvider for MemoryConfig {
    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            ConfigValue::Bool(b) => Some(b),
            ConfigValue::U64(_) => None,
        }
    }

    fn get_u64(&self, key: &str) -> Option<u64> {
        match self.get(key)? {
            ConfigValue::U64(v) => Some(v),
            ConfigValue::Bool(_) => None,
        }
    }
}

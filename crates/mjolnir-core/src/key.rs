//! Interned identifiers for dependency clusters.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

fn intern_table() -> &'static Mutex<HashSet<Arc<str>>> {
    static TABLE: OnceLock<Mutex<HashSet<Arc<str>>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashSet::new()))
}

/// A case-sensitive identifier naming a dependency cluster.
///
/// The same key string is used to look up the circuit breaker, the
/// bulkhead, and the fallback gate protecting that cluster. Keys are
/// interned in a process-wide table, so cloning and equality checks are
/// cheap regardless of how often a key is re-derived from configuration
/// or request data.
///
/// ```
/// use mjolnir_core::GroupKey;
///
/// let a = GroupKey::new("identity-api");
/// let b = GroupKey::new("identity-api");
/// assert_eq!(a, b);
/// assert_ne!(a, GroupKey::new("Identity-Api")); // case-sensitive
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey(Arc<str>);

impl GroupKey {
    /// Returns the interned key for `name`.
    pub fn new(name: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        let mut table = intern_table()
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = table.get(name) {
            return GroupKey(Arc::clone(existing));
        }
        let interned: Arc<str> = Arc::from(name);
        table.insert(Arc::clone(&interned));
        GroupKey(interned)
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupKey({:?})", &*self.0)
    }
}

impl From<&str> for GroupKey {
    fn from(name: &str) -> Self {
        GroupKey::new(name)
    }
}

impl From<String> for GroupKey {
    fn from(name: String) -> Self {
        GroupKey::new(name)
    }
}

impl From<&GroupKey> for GroupKey {
    fn from(key: &GroupKey) -> Self {
        key.clone()
    }
}

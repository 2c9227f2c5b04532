//! Per-resource mutual exclusion
//!
//! Watch callbacks and periodic sweeps for the same (namespace, name) must
//! serialize: a reconciliation may hold its lock across REST calls and
//! polling, and a later event has to observe the status it wrote. Locks are
//! keyed mutexes with a bounded acquire; a caller that cannot acquire in
//! time drops its event and relies on the next resync.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::controller::error::{Error, Result};

/// Default bound on lock acquisition
pub const LOCK_TIMEOUT_MS: u64 = 10_000;

/// Identity of a namespaced resource
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Guard proving exclusive access to a resource key; released on drop
pub struct LockHandle {
    _guard: OwnedMutexGuard<()>,
}

/// Registry of per-key locks with a bounded acquire
pub struct LockRegistry {
    locks: Mutex<HashMap<ResourceKey, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl LockRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquire the lock for `key`, waiting at most the configured timeout.
    ///
    /// The returned handle keeps the key locked until dropped. A timeout
    /// yields [`Error::LockTimeoutError`] and leaves the lock untouched.
    pub async fn acquire(&self, key: &ResourceKey) -> Result<LockHandle> {
        let lock = {
            let mut locks = self.locks.lock().expect("lock registry poisoned");
            // Entries referenced only by the map are unlocked and unused
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks.entry(key.clone()).or_default().clone()
        };

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(LockHandle { _guard: guard }),
            Err(_) => Err(Error::LockTimeoutError {
                key: key.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Number of keys currently tracked (held or recently held)
    pub fn len(&self) -> usize {
        self.locks.lock().expect("lock registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LockRegistry {
    fn default() -> Self {
        Self::new(Duration::from_millis(LOCK_TIMEOUT_MS))
    }
}

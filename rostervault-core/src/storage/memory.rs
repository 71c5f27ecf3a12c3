/*!
In-memory key-value store.
*/

use super::{entry_size, KeyValueStore};
use crate::{Result, StoreError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, String>,
    used: usize,
    disabled: bool,
}

/// Memory-backed store with optional byte quota
///
/// Quota accounting counts key plus value length and frees a replaced value
/// before charging the new one, which is how browser storage behaves. Clones
/// share the same entries, so a test can keep a handle to inspect or corrupt
/// records while the engine owns another.
///
/// # Example
/// ```rust
/// use rostervault_core::storage::{KeyValueStore, MemoryStore};
///
/// let store = MemoryStore::with_quota(16);
/// store.set("a", "1234").unwrap();
/// assert!(store.set("b", &"x".repeat(64)).is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes once `quota` bytes are used
    pub fn with_quota(quota: usize) -> Self {
        Self {
            inner: Arc::default(),
            quota: Some(quota),
        }
    }

    /// Make every operation fail with `Unavailable`, or lift that again
    pub fn set_disabled(&self, disabled: bool) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.disabled = disabled;
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.clear();
            inner.used = 0;
        }
    }

    /// Bytes currently charged against the quota
    pub fn used_bytes(&self) -> usize {
        self.inner.lock().map(|inner| inner.used).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|inner| inner.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::unavailable("memory store lock poisoned"))?;
        if inner.disabled {
            return Err(StoreError::unavailable("memory store is disabled"));
        }
        Ok(inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.lock()?;
        let freed = inner
            .entries
            .get(key)
            .map(|old| entry_size(key, old))
            .unwrap_or(0);
        let needed = inner.used - freed + entry_size(key, value);

        if let Some(quota) = self.quota {
            if needed > quota {
                return Err(StoreError::quota_exceeded(format!(
                    "setting '{key}' needs {needed} bytes, quota is {quota}"
                )));
            }
        }

        inner.entries.insert(key.to_string(), value.to_string());
        inner.used = needed;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut inner = self.lock()?;
        if let Some(old) = inner.entries.remove(key) {
            inner.used -= entry_size(key, &old);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.entries.keys().cloned().collect())
    }

    fn remaining_capacity(&self) -> Option<usize> {
        let quota = self.quota?;
        Some(quota.saturating_sub(self.used_bytes()))
    }
}

/*!
Fault-tolerant wrapper over a [`KeyValueStore`].

Reads, removals and enumeration never fail from the caller's point of view:
store faults are logged and read as "absent". Only writes report errors,
because the engine's save path needs to branch on them.
*/

use crate::config::STORAGE_TEST_KEY;
use crate::storage::KeyValueStore;
use crate::Result;
use tracing::{debug, warn};

/// Wraps a store and isolates every store-specific failure
#[derive(Debug, Clone)]
pub struct KvAdapter<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> KvAdapter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The wrapped store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Value under `key`, or `None` when absent or unreadable
    pub fn get(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "read failed, treating record as absent");
                None
            }
        }
    }

    /// Write `value` under `key`
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.store.set(key, value).map_err(|e| {
            debug!(key, bytes = value.len(), error = %e, "write rejected");
            e
        })
    }

    /// Remove `key`; failures are logged and otherwise ignored
    pub fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!(key, error = %e, "remove failed");
        }
    }

    /// Every stored key, or nothing when the store cannot be enumerated
    pub fn keys(&self) -> Vec<String> {
        self.store.keys().unwrap_or_else(|e| {
            warn!(error = %e, "key enumeration failed");
            Vec::new()
        })
    }

    /// Bytes still available, when the store reports it
    pub fn remaining_capacity(&self) -> Option<usize> {
        self.store.remaining_capacity()
    }

    /// Round-trip a sentinel through the store
    ///
    /// Returns `true` only if the sentinel could be written and read back
    /// unchanged. The sentinel is removed on every path.
    pub fn availability_check(&self) -> bool {
        let written = self.store.set(STORAGE_TEST_KEY, STORAGE_TEST_KEY);
        let read_back = written
            .as_ref()
            .ok()
            .and_then(|_| self.store.get(STORAGE_TEST_KEY).ok().flatten());
        self.remove(STORAGE_TEST_KEY);

        match (written, read_back) {
            (Ok(()), Some(value)) if value == STORAGE_TEST_KEY => true,
            (Err(e), _) => {
                warn!(error = %e, "store failed availability check");
                false
            }
            _ => {
                warn!("store did not return the availability sentinel");
                false
            }
        }
    }
}

/*!
Key-value stores backing the persistence engine.

This module defines the store abstraction (port) and concrete implementations
(adapters). The engine only ever sees string keys and string values, the same
shape a browser's synchronous key-value storage exposes, so any backend that
can hold strings under names can carry a roster.
*/

pub mod local;
pub mod memory;

use crate::Result;

/// Synchronous string key-value store
///
/// All methods take `&self`; implementations use interior mutability. Every
/// native failure must be translated into a [`crate::StoreError`] variant.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore {
    /// Read the value stored under `key`
    ///
    /// # Returns
    /// `Ok(None)` when the key does not exist
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace the value stored under `key`
    ///
    /// # Errors
    /// * `StoreError::QuotaExceeded` - If the store has no room for the value
    /// * `StoreError::Unavailable` - If the store cannot be written at all
    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing an absent key succeeds
    fn remove(&self, key: &str) -> Result<()>;

    /// Every key currently stored, in no particular order
    fn keys(&self) -> Result<Vec<String>>;

    /// Bytes still available, for stores that know their quota
    fn remaining_capacity(&self) -> Option<usize> {
        None
    }
}

/// Size a key/value pair occupies against a byte quota
pub(crate) fn entry_size(key: &str, value: &str) -> usize {
    key.len() + value.len()
}

pub use local::FileStore;
pub use memory::MemoryStore;

/*!
Persistence engine orchestrating saves, loads and backup recovery.

The engine owns the store adapter, the quota probe and the clock, and hands
out short-lived [`BackupManager`] views for everything backup-related.
*/

use crate::adapter::KvAdapter;
use crate::backup::{BackupInfo, BackupManager};
use crate::clock::{Clock, SystemClock};
use crate::config::{PersistConfig, StorageKeys};
use crate::observability;
use crate::quota::{DoublingProbe, QuotaProbe};
use crate::retry::with_degraded_retry;
use crate::storage::KeyValueStore;
use crate::{Result, StoreError};
use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;
use tracing::{debug, error, info, warn};

/// Saves and restores one roster snapshot with rotating backups
///
/// The snapshot is opaque to the engine: anything `serde` can turn into JSON
/// can be saved, and `load` hands back whatever type the caller asks for.
///
/// # Example
/// ```rust
/// use rostervault_core::{MemoryStore, PersistConfig, PersistenceEngine};
///
/// let engine = PersistenceEngine::new(MemoryStore::new(), PersistConfig::default())?;
/// engine.save(&vec!["bulbasaur", "charmander"])?;
/// engine.save(&vec!["squirtle"])?;
///
/// let team: Vec<String> = engine.load();
/// assert_eq!(team, vec!["squirtle"]);
///
/// // The first save was captured before being overwritten
/// let previous: Vec<String> = engine
///     .resolve_latest_valid(engine.backup_prefix())
///     .unwrap();
/// assert_eq!(previous, vec!["bulbasaur", "charmander"]);
/// # Ok::<(), rostervault_core::StoreError>(())
/// ```
pub struct PersistenceEngine<S, P = DoublingProbe>
where
    S: KeyValueStore,
    P: QuotaProbe,
{
    adapter: KvAdapter<S>,
    probe: P,
    clock: Box<dyn Clock>,
    config: PersistConfig,
    keys: StorageKeys,
}

impl<S: KeyValueStore> PersistenceEngine<S, DoublingProbe> {
    /// Create an engine probing quota by trial writes up to the configured ceiling
    ///
    /// # Errors
    /// * `StoreError::InvalidConfig` - If the configuration fails validation
    pub fn new(store: S, config: PersistConfig) -> Result<Self> {
        let probe = DoublingProbe::new(config.quota_ceiling);
        Self::with_probe(store, probe, config)
    }
}

impl<S, P> PersistenceEngine<S, P>
where
    S: KeyValueStore,
    P: QuotaProbe,
{
    /// Create an engine with a custom quota probe
    pub fn with_probe(store: S, probe: P, config: PersistConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            adapter: KvAdapter::new(store),
            probe,
            clock: Box::new(SystemClock),
            keys: config.keys(),
            config,
        })
    }

    /// Replace the clock used to timestamp backups
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    pub fn keys(&self) -> &StorageKeys {
        &self.keys
    }

    /// Prefix shared by this engine's backup records
    pub fn backup_prefix(&self) -> &str {
        &self.keys.backup_prefix
    }

    /// The underlying store
    pub fn store(&self) -> &S {
        self.adapter.store()
    }

    fn backups(&self) -> BackupManager<'_, S> {
        BackupManager::new(
            &self.adapter,
            self.clock.as_ref(),
            &self.keys,
            self.config.max_backups,
        )
    }

    /// Whether the store passes a write/read/delete round-trip
    pub fn is_available(&self) -> bool {
        self.adapter.availability_check()
    }

    /// Whether the quota probe finds room for `data_size` more bytes
    pub fn has_room(&self, data_size: usize) -> bool {
        self.probe.has_room(&self.adapter, data_size)
    }

    /// Save a snapshot to the primary record
    ///
    /// 1. Checks the store is usable at all
    /// 2. Serializes the snapshot and probes for room
    /// 3. Backs up the current primary, then overwrites it
    /// 4. On quota exhaustion (from the probe or a write), prunes backups down
    ///    to one and retries the bare write once
    ///
    /// # Errors
    /// * `StoreError::Unavailable` - If the store fails its availability check or a write
    /// * `StoreError::Serialization` - If the snapshot cannot be encoded
    /// * `StoreError::QuotaExceeded` - If the degraded retry also runs out of room
    pub fn save<T: Serialize + ?Sized>(&self, snapshot: &T) -> Result<()> {
        let result = self.save_inner(snapshot);
        if let Err(e) = &result {
            observability::record_save_failure();
            error!(error = %e, "snapshot not saved");
        }
        result
    }

    fn save_inner<T: Serialize + ?Sized>(&self, snapshot: &T) -> Result<()> {
        if !self.adapter.availability_check() {
            return Err(StoreError::unavailable(
                "store failed its availability check",
            ));
        }

        let data = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::serialization(format!("snapshot could not be encoded: {e}")))?;

        with_degraded_retry(
            "save",
            |attempt| {
                if attempt == 1 {
                    self.write_with_backup(&data)
                } else {
                    self.adapter.set(&self.keys.team, &data)
                }
            },
            |_| {
                observability::record_degraded_retry();
                let removed = self.backups().prune(&self.keys.backup_prefix, 1);
                info!(removed, "pruned backups to free space for save");
            },
        )?;

        observability::record_save(data.len());
        debug!(bytes = data.len(), "snapshot saved");
        Ok(())
    }

    fn write_with_backup(&self, data: &str) -> Result<()> {
        if !self.probe.has_room(&self.adapter, data.len()) {
            return Err(StoreError::quota_exceeded(format!(
                "not enough storage space for {} bytes",
                data.len()
            )));
        }
        self.backups().create_backup()?;
        self.adapter.set(&self.keys.team, data)
    }

    /// Load the snapshot, falling back through the backups
    ///
    /// Returns `T::default()` when neither the primary record nor any backup
    /// holds a usable snapshot. The primary record is not repaired; call
    /// [`restore_from_backup`](Self::restore_from_backup) for that.
    pub fn load<T: DeserializeOwned + Default>(&self) -> T {
        self.try_load().unwrap_or_default()
    }

    /// Like [`load`](Self::load), but `None` instead of an empty snapshot
    pub fn try_load<T: DeserializeOwned>(&self) -> Option<T> {
        match self.adapter.get(&self.keys.team) {
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(snapshot) => return Some(snapshot),
                Err(e) => warn!(error = %e, "primary record is corrupt, trying backups"),
            },
            None => debug!("no primary record, trying backups"),
        }

        let recovered = self.backups().latest_valid(&self.keys.backup_prefix)?;
        observability::record_backup_fallback();
        warn!(key = %recovered.key, "loaded snapshot from backup");
        Some(recovered.value)
    }

    /// Copy the primary record into a new backup record
    ///
    /// # Returns
    /// The new backup's key, or `None` when there is no primary record
    pub fn create_backup(&self) -> Result<Option<String>> {
        self.backups().create_backup()
    }

    /// Write the newest well-formed backup back to the primary record
    ///
    /// # Returns
    /// `false` when no backup could be restored; nothing is written then
    pub fn restore_from_backup(&self) -> bool {
        let Some(backup) = self
            .backups()
            .latest_valid::<IgnoredAny>(&self.keys.backup_prefix)
        else {
            info!("no valid backup to restore");
            return false;
        };

        match self.adapter.set(&self.keys.team, &backup.raw) {
            Ok(()) => {
                info!(key = %backup.key, "primary record restored from backup");
                true
            }
            Err(e) => {
                error!(key = %backup.key, error = %e, "restoring backup failed");
                false
            }
        }
    }

    /// Time of the last successful backup
    pub fn get_last_backup_time(&self) -> Option<DateTime<Utc>> {
        self.backups().last_backup_time()
    }

    /// Every key starting with `prefix`, unordered
    pub fn list_backup_keys(&self, prefix: &str) -> Vec<String> {
        self.backups().list_backups(prefix)
    }

    /// Remove all but the newest `keep` backups under `prefix`
    pub fn prune(&self, prefix: &str, keep: usize) -> usize {
        self.backups().prune(prefix, keep)
    }

    /// Newest backup under `prefix` that deserializes into `T`
    pub fn resolve_latest_valid<T: DeserializeOwned>(&self, prefix: &str) -> Option<T> {
        self.backups().resolve_latest_valid(prefix)
    }

    /// Diagnostic listing of this engine's backups, newest first
    pub fn describe_backups(&self) -> Vec<BackupInfo> {
        self.backups().describe_backups(&self.keys.backup_prefix)
    }

    /// Move a snapshot from the pre-backup single-record layout
    ///
    /// Only runs when there is no primary record. The legacy record is decoded
    /// as `T` (so `T`'s deserializer can upgrade old fields) and saved through
    /// the normal save path. The legacy record itself is left in place.
    ///
    /// # Returns
    /// Whether a legacy snapshot was imported
    pub fn import_legacy<T: DeserializeOwned + Serialize>(&self) -> Result<bool> {
        if self.adapter.get(&self.keys.team).is_some() {
            debug!("primary record exists, legacy import skipped");
            return Ok(false);
        }
        let Some(raw) = self.adapter.get(&self.keys.legacy_team) else {
            return Ok(false);
        };

        let snapshot: T = serde_json::from_str(&raw).map_err(|e| {
            StoreError::serialization(format!(
                "legacy record '{}' could not be decoded: {e}",
                self.keys.legacy_team
            ))
        })?;
        self.save(&snapshot)?;
        info!(key = %self.keys.legacy_team, "imported legacy snapshot");
        Ok(true)
    }

    /// Remove the primary record, the marker and every backup
    pub fn clear(&self) {
        for key in self.list_backup_keys(&self.keys.backup_prefix) {
            self.adapter.remove(&key);
        }
        self.adapter.remove(&self.keys.team);
        self.adapter.remove(&self.keys.last_backup);
    }
}

/*!
Timestamped backup records: creation, enumeration, pruning and the restore chain.

Backup keys have the form `{prefix}-{timestamp}` where the timestamp is epoch
milliseconds written zero-padded to 20 digits. Ordering always parses the
numeric suffix, so keys written without padding still sort chronologically.
*/

use crate::adapter::KvAdapter;
use crate::clock::Clock;
use crate::config::StorageKeys;
use crate::observability;
use crate::storage::KeyValueStore;
use crate::Result;
use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Diagnostic view of one backup record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    pub key: String,
    /// Creation time parsed from the key, if the suffix is a timestamp
    pub created: Option<DateTime<Utc>>,
    /// Payload length in bytes
    pub size: usize,
    /// Hex SHA-256 of the payload
    pub fingerprint: String,
}

/// A backup record that deserialized successfully
#[derive(Debug, Clone)]
pub struct ValidBackup<T> {
    pub key: String,
    /// The stored payload, byte-for-byte
    pub raw: String,
    pub value: T,
}

/// Build the key of a backup taken at `timestamp`
pub fn backup_key(prefix: &str, timestamp: u64) -> String {
    format!("{prefix}-{timestamp:020}")
}

/// Timestamp embedded in a backup key, if it has one
pub fn backup_timestamp(prefix: &str, key: &str) -> Option<u64> {
    key.strip_prefix(prefix)?.strip_prefix('-')?.parse().ok()
}

/// Sort backup keys oldest first; keys without a parsable timestamp come first
pub fn sort_oldest_first(prefix: &str, keys: &mut [String]) {
    keys.sort_by(|a, b| {
        (backup_timestamp(prefix, a), a.as_str()).cmp(&(backup_timestamp(prefix, b), b.as_str()))
    });
}

fn millis_to_datetime(millis: u64) -> Option<DateTime<Utc>> {
    let millis = i64::try_from(millis).ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// Operations on the backup set of one store
///
/// This is a borrowed view over the engine's adapter; it holds no state of
/// its own, so several managers over the same store observe the same records.
pub struct BackupManager<'a, S: KeyValueStore> {
    adapter: &'a KvAdapter<S>,
    clock: &'a dyn Clock,
    keys: &'a StorageKeys,
    max_backups: usize,
}

impl<'a, S: KeyValueStore> BackupManager<'a, S> {
    pub fn new(
        adapter: &'a KvAdapter<S>,
        clock: &'a dyn Clock,
        keys: &'a StorageKeys,
        max_backups: usize,
    ) -> Self {
        Self {
            adapter,
            clock,
            keys,
            max_backups,
        }
    }

    /// Copy the primary record into a new backup record
    ///
    /// Does nothing when no primary record exists. Otherwise writes the backup,
    /// prunes the set down to the retention count and records the backup time
    /// in the last-backup marker.
    ///
    /// # Returns
    /// The key of the backup written, or `None` when there was nothing to copy
    ///
    /// # Errors
    /// Any error from writing the backup record; the primary is left untouched
    pub fn create_backup(&self) -> Result<Option<String>> {
        let Some(team) = self.adapter.get(&self.keys.team) else {
            debug!("no primary record, skipping backup");
            return Ok(None);
        };

        let prefix = &self.keys.backup_prefix;
        let mut timestamp = self.clock.now_millis();
        while self.adapter.get(&backup_key(prefix, timestamp)).is_some() {
            timestamp += 1;
        }
        let key = backup_key(prefix, timestamp);

        self.adapter.set(&key, &team)?;
        observability::record_backup_created();
        debug!(key = %key, bytes = team.len(), "backup written");

        self.prune(prefix, self.max_backups);

        if let Err(e) = self
            .adapter
            .set(&self.keys.last_backup, &timestamp.to_string())
        {
            warn!(error = %e, "backup written but last-backup marker could not be updated");
        }
        Ok(Some(key))
    }

    /// Every key starting with `prefix`, in store order
    pub fn list_backups(&self, prefix: &str) -> Vec<String> {
        self.adapter
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect()
    }

    /// Remove all but the newest `keep` backups
    ///
    /// # Returns
    /// The number of records removed
    pub fn prune(&self, prefix: &str, keep: usize) -> usize {
        let mut keys = self.list_backups(prefix);
        if keys.len() <= keep {
            return 0;
        }
        sort_oldest_first(prefix, &mut keys);

        let excess = keys.len() - keep;
        for key in &keys[..excess] {
            self.adapter.remove(key);
        }
        debug!(removed = excess, kept = keep, "pruned backups");
        observability::record_backups_pruned(excess);
        excess
    }

    /// Newest backup whose payload deserializes into `T`
    ///
    /// Backups that fail to deserialize, or that vanish between listing and
    /// reading, are skipped rather than deleted.
    pub fn latest_valid<T: DeserializeOwned>(&self, prefix: &str) -> Option<ValidBackup<T>> {
        let mut keys = self.list_backups(prefix);
        sort_oldest_first(prefix, &mut keys);

        for key in keys.into_iter().rev() {
            let Some(raw) = self.adapter.get(&key) else {
                debug!(key = %key, "backup disappeared before it could be read");
                continue;
            };
            match serde_json::from_str::<T>(&raw) {
                Ok(value) => return Some(ValidBackup { key, raw, value }),
                Err(e) => warn!(key = %key, error = %e, "skipping unreadable backup"),
            }
        }
        None
    }

    /// Payload of the newest backup that deserializes into `T`
    pub fn resolve_latest_valid<T: DeserializeOwned>(&self, prefix: &str) -> Option<T> {
        self.latest_valid(prefix).map(|backup| backup.value)
    }

    /// Key, age, size and fingerprint of every backup, newest first
    pub fn describe_backups(&self, prefix: &str) -> Vec<BackupInfo> {
        let mut keys = self.list_backups(prefix);
        sort_oldest_first(prefix, &mut keys);

        keys.into_iter()
            .rev()
            .filter_map(|key| {
                let payload = self.adapter.get(&key)?;
                Some(BackupInfo {
                    created: backup_timestamp(prefix, &key).and_then(millis_to_datetime),
                    size: payload.len(),
                    fingerprint: format!("{:x}", Sha256::digest(payload.as_bytes())),
                    key,
                })
            })
            .collect()
    }

    /// Time recorded by the last successful backup
    pub fn last_backup_time(&self) -> Option<DateTime<Utc>> {
        let marker = self.adapter.get(&self.keys.last_backup)?;
        let millis = marker.trim().parse::<u64>().ok()?;
        millis_to_datetime(millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PersistConfig;
    use crate::storage::{MemoryStore, MockKeyValueStore};
    use crate::StoreError;
    use mockall::predicate::eq;

    struct Fixture {
        store: MemoryStore,
        adapter: KvAdapter<MemoryStore>,
        clock: ManualClock,
        keys: StorageKeys,
    }

    impl Fixture {
        fn new() -> Self {
            let store = MemoryStore::new();
            Self {
                adapter: KvAdapter::new(store.clone()),
                store,
                clock: ManualClock::new(1_700_000_000_000),
                keys: PersistConfig::default().keys(),
            }
        }

        fn manager(&self, max_backups: usize) -> BackupManager<'_, MemoryStore> {
            BackupManager::new(&self.adapter, &self.clock, &self.keys, max_backups)
        }
    }

    #[test]
    fn test_backup_key_round_trip() {
        let key = backup_key("ns:team-backup", 1_700_000_000_123);
        assert_eq!(key, "ns:team-backup-00000001700000000123");
        assert_eq!(
            backup_timestamp("ns:team-backup", &key),
            Some(1_700_000_000_123)
        );
        assert_eq!(
            backup_timestamp("ns:team-backup", "ns:team-backup-1700000000123"),
            Some(1_700_000_000_123)
        );
        assert_eq!(backup_timestamp("ns:team-backup", "ns:team-backup-x"), None);
        assert_eq!(backup_timestamp("ns:team-backup", "ns:team"), None);
    }

    #[test]
    fn test_sort_handles_mixed_widths() {
        let prefix = "p";
        let mut keys = vec![
            "p-10000000000000".to_string(),
            backup_key(prefix, 999),
            "p-1000".to_string(),
            "p-garbage".to_string(),
        ];
        sort_oldest_first(prefix, &mut keys);
        assert_eq!(
            keys,
            vec![
                "p-garbage".to_string(),
                backup_key(prefix, 999),
                "p-1000".to_string(),
                "p-10000000000000".to_string(),
            ]
        );
    }

    #[test]
    fn test_create_backup_without_primary_is_noop() {
        let fx = Fixture::new();
        assert_eq!(fx.manager(3).create_backup().unwrap(), None);
        assert!(fx.store.is_empty());
        assert_eq!(fx.manager(3).last_backup_time(), None);
    }

    #[test]
    fn test_create_backup_copies_primary_and_sets_marker() {
        let fx = Fixture::new();
        fx.store.set(&fx.keys.team, r#"[{"nickname":"Test"}]"#).unwrap();

        let key = fx.manager(3).create_backup().unwrap().unwrap();
        assert_eq!(key, backup_key(&fx.keys.backup_prefix, 1_700_000_000_000));
        assert_eq!(
            fx.store.get(&key).unwrap().as_deref(),
            Some(r#"[{"nickname":"Test"}]"#)
        );
        assert_eq!(
            fx.manager(3).last_backup_time().unwrap().timestamp_millis(),
            1_700_000_000_000
        );
    }

    #[test]
    fn test_same_millisecond_backups_get_distinct_keys() {
        let fx = Fixture::new();
        fx.store.set(&fx.keys.team, "[1]").unwrap();
        let first = fx.manager(3).create_backup().unwrap().unwrap();
        fx.store.set(&fx.keys.team, "[2]").unwrap();
        let second = fx.manager(3).create_backup().unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(fx.manager(3).list_backups(&fx.keys.backup_prefix).len(), 2);
        let latest: Vec<u8> = fx
            .manager(3)
            .resolve_latest_valid(&fx.keys.backup_prefix)
            .unwrap();
        assert_eq!(latest, vec![2]);
    }

    #[test]
    fn test_retention_applied_on_create() {
        let fx = Fixture::new();
        fx.store.set(&fx.keys.team, "[]").unwrap();
        for _ in 0..5 {
            fx.manager(2).create_backup().unwrap();
            fx.clock.advance(10);
        }

        let mut keys = fx.manager(2).list_backups(&fx.keys.backup_prefix);
        sort_oldest_first(&fx.keys.backup_prefix, &mut keys);
        assert_eq!(
            keys,
            vec![
                backup_key(&fx.keys.backup_prefix, 1_700_000_000_030),
                backup_key(&fx.keys.backup_prefix, 1_700_000_000_040),
            ]
        );
    }

    #[test]
    fn test_prune_is_idempotent_and_accepts_zero() {
        let fx = Fixture::new();
        let prefix = fx.keys.backup_prefix.clone();
        for ts in [5, 1, 3, 2, 4] {
            fx.store.set(&backup_key(&prefix, ts), "[]").unwrap();
        }

        let manager = fx.manager(10);
        assert_eq!(manager.prune(&prefix, 3), 2);
        assert_eq!(manager.prune(&prefix, 3), 0);
        assert_eq!(fx.store.get(&backup_key(&prefix, 2)).unwrap(), None);
        assert!(fx.store.get(&backup_key(&prefix, 5)).unwrap().is_some());

        assert_eq!(manager.prune(&prefix, 0), 3);
        assert!(manager.list_backups(&prefix).is_empty());
    }

    #[test]
    fn test_prune_leaves_other_keys_alone() {
        let fx = Fixture::new();
        let prefix = fx.keys.backup_prefix.clone();
        fx.store.set(&fx.keys.team, "[]").unwrap();
        fx.store.set(&fx.keys.last_backup, "1").unwrap();
        fx.store.set(&backup_key(&prefix, 1), "[]").unwrap();

        fx.manager(3).prune(&prefix, 0);
        assert_eq!(fx.store.len(), 2);
    }

    #[test]
    fn test_latest_valid_skips_corrupt_newest() {
        let fx = Fixture::new();
        let prefix = fx.keys.backup_prefix.clone();
        fx.store.set(&backup_key(&prefix, 1), r#"["oldest"]"#).unwrap();
        fx.store.set(&backup_key(&prefix, 2), r#"["middle"]"#).unwrap();
        fx.store.set(&backup_key(&prefix, 3), "not-json").unwrap();

        let backup = fx.manager(3).latest_valid::<Vec<String>>(&prefix).unwrap();
        assert_eq!(backup.key, backup_key(&prefix, 2));
        assert_eq!(backup.value, vec!["middle".to_string()]);
        assert_eq!(backup.raw, r#"["middle"]"#);
        // Corrupt records are skipped, never deleted
        assert!(fx.store.get(&backup_key(&prefix, 3)).unwrap().is_some());
    }

    #[test]
    fn test_latest_valid_none_when_all_corrupt() {
        let fx = Fixture::new();
        let prefix = fx.keys.backup_prefix.clone();
        fx.store.set(&backup_key(&prefix, 1), "{").unwrap();
        fx.store.set(&backup_key(&prefix, 2), "").unwrap();

        assert!(fx
            .manager(3)
            .resolve_latest_valid::<serde_json::Value>(&prefix)
            .is_none());
        assert!(fx
            .manager(3)
            .resolve_latest_valid::<serde_json::Value>("unused-prefix")
            .is_none());
    }

    #[test]
    fn test_describe_backups_newest_first() {
        let fx = Fixture::new();
        let prefix = fx.keys.backup_prefix.clone();
        fx.store.set(&backup_key(&prefix, 1_000), "[]").unwrap();
        fx.store.set(&backup_key(&prefix, 2_000), "[1,2]").unwrap();

        let infos = fx.manager(3).describe_backups(&prefix);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].key, backup_key(&prefix, 2_000));
        assert_eq!(infos[0].size, 5);
        assert_eq!(infos[0].created.unwrap().timestamp_millis(), 2_000);
        assert_eq!(
            infos[1].fingerprint,
            "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945"
        );
    }

    #[test]
    fn test_unparsable_marker_reads_as_none() {
        let fx = Fixture::new();
        fx.store.set(&fx.keys.last_backup, "yesterday").unwrap();
        assert_eq!(fx.manager(3).last_backup_time(), None);
    }

    #[test]
    fn test_backup_vanishing_between_listing_and_reading() {
        let keys = PersistConfig::default().keys();
        let prefix = keys.backup_prefix.clone();
        let older = backup_key(&prefix, 1);
        let newer = backup_key(&prefix, 2);

        let mut mock = MockKeyValueStore::new();
        let listed = vec![older.clone(), newer.clone()];
        mock.expect_keys().returning(move || Ok(listed.clone()));
        mock.expect_get()
            .with(eq(newer.clone()))
            .returning(|_| Ok(None));
        mock.expect_get()
            .with(eq(older.clone()))
            .returning(|_| Ok(Some(r#"["old"]"#.to_string())));
        mock.expect_remove()
            .with(eq(newer.clone()))
            .times(1)
            .returning(|key| Err(StoreError::not_found(format!("'{key}' already removed"))));
        mock.expect_remove()
            .with(eq(older.clone()))
            .times(1)
            .returning(|_| Ok(()));

        let adapter = KvAdapter::new(mock);
        let clock = ManualClock::new(10);
        let manager = BackupManager::new(&adapter, &clock, &keys, 3);

        let resolved: Vec<String> = manager.resolve_latest_valid(&prefix).unwrap();
        assert_eq!(resolved, vec!["old".to_string()]);
        assert_eq!(manager.prune(&prefix, 0), 2);
    }
}

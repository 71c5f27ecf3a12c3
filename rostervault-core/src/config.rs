//! Configuration for the persistence engine
//!
//! Key names, the backup retention count and the quota probe ceiling are held
//! in an explicit [`PersistConfig`] passed to the engine at construction, so
//! independent engines (and tests) never share hidden state.

use serde::{Deserialize, Serialize};

/// Default namespace prefixed to every engine-owned key
pub const DEFAULT_NAMESPACE: &str = "nuzlocke-roster";

/// Default number of backup records retained after pruning
pub const DEFAULT_MAX_BACKUPS: usize = 3;

/// Default upper bound, in bytes, of the quota probe's trial writes
pub const DEFAULT_QUOTA_CEILING: usize = 10_000_000;

/// Key of the single-record layout used before backups were introduced
pub const LEGACY_TEAM_KEY: &str = "nuzlocke-team";

/// Sentinel key used by the availability round-trip
pub const STORAGE_TEST_KEY: &str = "__storage_test__";

/// Sentinel key used by the doubling quota probe
pub const QUOTA_TEST_KEY: &str = "__quota_test__";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Prefix for the primary, backup and marker keys
    pub namespace: String,
    /// Backups kept by the normal prune after each backup
    pub max_backups: usize,
    /// Largest trial write the quota probe attempts, in bytes
    pub quota_ceiling: usize,
}

/// Concrete key names derived from a [`PersistConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Primary record
    pub team: String,
    /// Prefix shared by every backup record
    pub backup_prefix: String,
    /// Last-backup marker
    pub last_backup: String,
    /// Pre-backup single-record layout
    pub legacy_team: String,
}

impl PersistConfig {
    /// Create a configuration with the default namespace and limits
    pub fn new() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_backups: DEFAULT_MAX_BACKUPS,
            quota_ceiling: DEFAULT_QUOTA_CEILING,
        }
    }

    pub fn with_namespace<S: Into<String>>(mut self, namespace: S) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    pub fn with_quota_ceiling(mut self, quota_ceiling: usize) -> Self {
        self.quota_ceiling = quota_ceiling;
        self
    }

    /// Derive the key layout for this namespace
    pub fn keys(&self) -> StorageKeys {
        StorageKeys {
            team: format!("{}:team", self.namespace),
            backup_prefix: format!("{}:team-backup", self.namespace),
            last_backup: format!("{}:last-backup", self.namespace),
            legacy_team: LEGACY_TEAM_KEY.to_string(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.namespace.trim().is_empty() {
            return Err(crate::StoreError::invalid_config(
                "namespace must not be empty",
            ));
        }
        if self.quota_ceiling == 0 {
            return Err(crate::StoreError::invalid_config(
                "quota ceiling must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self::new()
    }
}

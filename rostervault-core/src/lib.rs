/*!
# Rostervault Core Engine

Persistence for a roster snapshot kept in a synchronous string key-value
store, the kind of store a browser exposes as local storage.

- Saves back up the current record before overwriting it, keeping a rotating
  set of timestamped backups
- Available space is probed before writing; when the store is full the engine
  prunes backups down to one and retries the write once
- Loads fall back from a missing or corrupt record to the newest readable
  backup, then to an empty snapshot
- Stores and quota probes are pluggable

## Usage

```rust
use rostervault_core::{FileStore, PersistConfig, PersistenceEngine};
use rostervault_core::roster::{default_team, TeamSlot};

let dir = tempfile::tempdir()?;
let engine = PersistenceEngine::new(FileStore::new(dir.path()), PersistConfig::default())?;

let mut team = default_team();
team[0].nickname = "Sprout".to_string();
engine.save(&team)?;

let loaded: Vec<TeamSlot> = engine.load();
assert_eq!(loaded[0].nickname, "Sprout");
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

pub mod adapter;
pub mod backup;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod observability;
pub mod quota;
pub mod retry;
pub mod roster;
pub mod storage;


pub use adapter::KvAdapter;
pub use backup::{BackupInfo, BackupManager};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{PersistConfig, StorageKeys};
pub use engine::PersistenceEngine;
pub use error::{Result, StoreError};
pub use quota::{DoublingProbe, QuotaProbe, ReportedQuotaProbe};
pub use storage::{FileStore, KeyValueStore, MemoryStore};

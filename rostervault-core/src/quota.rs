/*!
Quota probing strategies.

Browser-style stores expose no quota API, so the default strategy estimates
headroom by growing a sentinel value until the store rejects it. Stores that
do know their remaining capacity can answer exactly instead.
*/

use crate::adapter::KvAdapter;
use crate::config::{DEFAULT_QUOTA_CEILING, QUOTA_TEST_KEY};
use crate::storage::KeyValueStore;
use tracing::debug;

/// Answers "can the store take at least `data_size` more bytes?"
pub trait QuotaProbe {
    fn has_room<S: KeyValueStore>(&self, adapter: &KvAdapter<S>, data_size: usize) -> bool;
}

/// Trial-write probe
///
/// Writes a sentinel of 1, 2, 4, ... bytes to [`QUOTA_TEST_KEY`] until a write
/// fails or the size reaches the ceiling (the last attempt is clamped to the
/// ceiling exactly). The probe key is removed on every exit path.
#[derive(Debug, Clone, Copy)]
pub struct DoublingProbe {
    ceiling: usize,
}

impl DoublingProbe {
    pub fn new(ceiling: usize) -> Self {
        Self {
            ceiling: ceiling.max(1),
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Largest sentinel the store accepted, capped at the ceiling
    pub fn headroom<S: KeyValueStore>(&self, adapter: &KvAdapter<S>) -> usize {
        let _cleanup = ProbeCleanup(adapter);
        let mut last_successful = 0;
        let mut size = 1usize;

        loop {
            let attempt = size.min(self.ceiling);
            if adapter.set(QUOTA_TEST_KEY, &"1".repeat(attempt)).is_err() {
                break;
            }
            last_successful = attempt;
            if attempt == self.ceiling {
                break;
            }
            size = size.saturating_mul(2);
        }

        debug!(last_successful, ceiling = self.ceiling, "quota probe finished");
        last_successful
    }
}

impl Default for DoublingProbe {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTA_CEILING)
    }
}

impl QuotaProbe for DoublingProbe {
    fn has_room<S: KeyValueStore>(&self, adapter: &KvAdapter<S>, data_size: usize) -> bool {
        self.headroom(adapter) > data_size
    }
}

/// Removes the probe key when dropped, including on unwind
struct ProbeCleanup<'a, S: KeyValueStore>(&'a KvAdapter<S>);

impl<S: KeyValueStore> Drop for ProbeCleanup<'_, S> {
    fn drop(&mut self) {
        self.0.remove(QUOTA_TEST_KEY);
    }
}

/// Trusts the store's own capacity report, probing only when it has none
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportedQuotaProbe {
    fallback: DoublingProbe,
}

impl ReportedQuotaProbe {
    pub fn new(fallback: DoublingProbe) -> Self {
        Self { fallback }
    }
}

impl QuotaProbe for ReportedQuotaProbe {
    fn has_room<S: KeyValueStore>(&self, adapter: &KvAdapter<S>, data_size: usize) -> bool {
        match adapter.remaining_capacity() {
            Some(remaining) => remaining > data_size,
            None => self.fallback.has_room(adapter, data_size),
        }
    }
}

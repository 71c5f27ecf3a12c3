/*!
Observability for the persistence engine.

- Structured logging setup on top of `tracing-subscriber`
- Prometheus counters for saves, backups and recoveries (`metrics` feature)
*/

#[cfg(feature = "metrics")]
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing::subscriber::set_global_default;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{Result, StoreError};

/// Global metrics instance
#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<PersistMetrics>> = OnceLock::new();

/// Metrics collection for persistence operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct PersistMetrics {
    pub saves_total: IntCounter,
    pub save_failures_total: IntCounter,
    pub degraded_retries_total: IntCounter,
    pub backups_created_total: IntCounter,
    pub backups_pruned_total: IntCounter,
    pub backup_fallbacks_total: IntCounter,
    pub snapshot_size_bytes: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help)
        .map_err(|e| StoreError::observability(format!("Failed to create {name}: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| StoreError::observability(format!("Failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
impl PersistMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let snapshot_size_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "rostervault_snapshot_size_bytes",
                "Serialized size of saved snapshots in bytes",
            )
            .buckets(prometheus::exponential_buckets(256.0, 4.0, 8).map_err(|e| {
                StoreError::observability(format!("Failed to build size buckets: {e}"))
            })?),
        )
        .map_err(|e| {
            StoreError::observability(format!("Failed to create snapshot_size_bytes: {e}"))
        })?;
        registry
            .register(Box::new(snapshot_size_bytes.clone()))
            .map_err(|e| {
                StoreError::observability(format!("Failed to register snapshot_size_bytes: {e}"))
            })?;

        Ok(Self {
            saves_total: counter(
                &registry,
                "rostervault_saves_total",
                "Snapshots written to the primary record",
            )?,
            save_failures_total: counter(
                &registry,
                "rostervault_save_failures_total",
                "Save calls that returned an error",
            )?,
            degraded_retries_total: counter(
                &registry,
                "rostervault_degraded_retries_total",
                "Saves that fell back to prune-and-retry",
            )?,
            backups_created_total: counter(
                &registry,
                "rostervault_backups_created_total",
                "Backup records written",
            )?,
            backups_pruned_total: counter(
                &registry,
                "rostervault_backups_pruned_total",
                "Backup records removed by pruning",
            )?,
            backup_fallbacks_total: counter(
                &registry,
                "rostervault_backup_fallbacks_total",
                "Loads served from a backup instead of the primary record",
            )?,
            snapshot_size_bytes,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    pub fn global() -> Option<&'static PersistMetrics> {
        METRICS.get_or_init(|| Self::new().ok()).as_ref()
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| StoreError::observability(format!("Failed to encode metrics: {e}")))?;

        String::from_utf8(buffer).map_err(|e| {
            StoreError::observability(format!("Failed to convert metrics to string: {e}"))
        })
    }
}

/// Render the global metrics, or nothing when the `metrics` feature is off
pub fn gather_metrics() -> Result<String> {
    #[cfg(feature = "metrics")]
    if let Some(metrics) = PersistMetrics::global() {
        return metrics.gather_metrics();
    }
    Ok(String::new())
}

pub(crate) fn record_save(size_bytes: usize) {
    #[cfg(feature = "metrics")]
    if let Some(m) = PersistMetrics::global() {
        m.saves_total.inc();
        m.snapshot_size_bytes.observe(size_bytes as f64);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = size_bytes;
}

pub(crate) fn record_save_failure() {
    #[cfg(feature = "metrics")]
    if let Some(m) = PersistMetrics::global() {
        m.save_failures_total.inc();
    }
}

pub(crate) fn record_degraded_retry() {
    #[cfg(feature = "metrics")]
    if let Some(m) = PersistMetrics::global() {
        m.degraded_retries_total.inc();
    }
}

pub(crate) fn record_backup_created() {
    #[cfg(feature = "metrics")]
    if let Some(m) = PersistMetrics::global() {
        m.backups_created_total.inc();
    }
}

pub(crate) fn record_backups_pruned(count: usize) {
    #[cfg(feature = "metrics")]
    if let Some(m) = PersistMetrics::global() {
        m.backups_pruned_total.inc_by(count as u64);
    }
    #[cfg(not(feature = "metrics"))]
    let _ = count;
}

pub(crate) fn record_backup_fallback() {
    #[cfg(feature = "metrics")]
    if let Some(m) = PersistMetrics::global() {
        m.backup_fallbacks_total.inc();
    }
}

/// Initialize the global tracing subscriber
///
/// # Arguments
/// * `verbose` - Default to `debug` instead of `info` when `RUST_LOG` is unset
/// * `json` - Emit JSON lines instead of human-readable output
pub fn init_observability(verbose: bool, json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    PersistMetrics::global();

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("rostervault_core={level},rostervault={level}"))
    });
    let registry = TracingRegistry::default().with(filter);

    let result = if json {
        set_global_default(
            registry.with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(false),
            ),
        )
    } else {
        set_global_default(registry.with(tracing_subscriber::fmt::layer().with_target(false)))
    };
    result.map_err(|e| {
        StoreError::observability(format!("Failed to set global tracing subscriber: {e}"))
    })?;

    tracing::debug!("rostervault observability initialized");
    Ok(())
}

/// Initialize observability with default settings
pub fn init_default_observability() -> Result<()> {
    init_observability(false, false)
}

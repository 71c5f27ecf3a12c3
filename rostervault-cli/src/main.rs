/*!
Rostervault CLI - inspect and repair a roster store from the command line.

Works against the directory-backed store, one file per key, using the same
key layout the engine uses everywhere else.
*/

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rostervault_core::observability::{gather_metrics, init_observability};
use rostervault_core::roster::TeamSlot;
use rostervault_core::{
    DoublingProbe, FileStore, PersistConfig, PersistenceEngine, ReportedQuotaProbe,
};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use tabled::{Table, Tabled};
use tracing::info;

type Engine = PersistenceEngine<FileStore, ReportedQuotaProbe>;

#[derive(Parser)]
#[command(name = "rostervault")]
#[command(about = "Inspect, back up and restore roster snapshots")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Directory holding the store
    #[arg(short, long, global = true, env = "ROSTERVAULT_DIR", default_value = "./roster-store")]
    dir: PathBuf,

    /// Key namespace
    #[arg(short, long, global = true, env = "ROSTERVAULT_NAMESPACE", default_value = "nuzlocke-roster")]
    namespace: String,

    /// Backups kept after each save
    #[arg(long, global = true, env = "ROSTERVAULT_MAX_BACKUPS", default_value_t = 3)]
    max_backups: usize,

    /// Largest trial write of the quota probe, in bytes
    #[arg(long, global = true, env = "ROSTERVAULT_QUOTA_CEILING", default_value_t = 10_000_000)]
    quota_ceiling: usize,

    /// Cap the store at this many bytes
    #[arg(long, global = true, env = "ROSTERVAULT_QUOTA")]
    quota: Option<usize>,

    /// Print Prometheus metrics after the command
    #[arg(long, global = true)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save a JSON snapshot as the primary record
    Save {
        /// File to read, or `-` for stdin
        input: String,
    },
    /// Print the current snapshot, falling back to backups
    Load {
        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },
    /// Back up the primary record now
    Backup,
    /// List backup records, newest first
    Backups,
    /// Remove all but the newest backups
    Prune {
        /// Backups to keep
        #[arg(short, long)]
        keep: usize,
    },
    /// Overwrite the primary record with the newest readable backup
    Restore,
    /// Show when the last backup was taken
    LastBackup,
    /// Move a roster saved by the single-record layout into the primary record
    ImportLegacy,
    /// Check the store is writable and has room for a snapshot
    Check {
        /// Snapshot size to check for, in bytes
        #[arg(short, long, default_value_t = 0)]
        size: usize,
    },
    /// Delete the primary record, the marker and every backup
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Tabled)]
struct BackupRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Created")]
    created: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "SHA-256")]
    fingerprint: String,
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_observability(cli.verbose, cli.json_logs)?;

    let engine = create_engine(&cli)?;

    match cli.command {
        Commands::Save { ref input } => save(&engine, input)?,
        Commands::Load { pretty } => load(&engine, pretty)?,
        Commands::Backup => match engine.create_backup()? {
            Some(key) => println!("✓ Backup written: {key}"),
            None => println!("No primary record to back up"),
        },
        Commands::Backups => list_backups(&engine),
        Commands::Prune { keep } => {
            let removed = engine.prune(engine.backup_prefix(), keep);
            println!("✓ Removed {removed} backup(s)");
        }
        Commands::Restore => {
            if !engine.restore_from_backup() {
                bail!("no readable backup to restore from");
            }
            println!("✓ Primary record restored from the newest backup");
        }
        Commands::LastBackup => match engine.get_last_backup_time() {
            Some(time) => println!("{}", format_timestamp(time.timestamp_millis())),
            None => println!("No backup recorded"),
        },
        Commands::ImportLegacy => {
            if engine.import_legacy::<Vec<TeamSlot>>()? {
                println!("✓ Legacy roster imported");
            } else {
                println!("Nothing to import");
            }
        }
        Commands::Check { size } => check(&engine, size)?,
        Commands::Clear { force } => clear(&engine, force)?,
    }

    if cli.metrics {
        eprint!("{}", gather_metrics()?);
    }

    Ok(())
}

fn create_engine(cli: &Cli) -> Result<Engine, anyhow::Error> {
    let config = PersistConfig::new()
        .with_namespace(cli.namespace.clone())
        .with_max_backups(cli.max_backups)
        .with_quota_ceiling(cli.quota_ceiling);

    let mut store = FileStore::new(&cli.dir);
    if let Some(quota) = cli.quota {
        store = store.with_quota(quota);
    }

    let probe = ReportedQuotaProbe::new(DoublingProbe::new(config.quota_ceiling));
    info!("Opening store at {}", cli.dir.display());
    Ok(PersistenceEngine::with_probe(store, probe, config)?)
}

fn save(engine: &Engine, input: &str) -> Result<(), anyhow::Error> {
    let mut raw = String::new();
    if input == "-" {
        io::stdin().read_to_string(&mut raw)?;
    } else {
        raw = std::fs::read_to_string(input).with_context(|| format!("reading {input}"))?;
    }

    let snapshot: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("{input} is not valid JSON"))?;
    engine.save(&snapshot)?;
    println!("✓ Snapshot saved ({})", format_size(raw.len() as u64));
    Ok(())
}

fn load(engine: &Engine, pretty: bool) -> Result<(), anyhow::Error> {
    let Some(snapshot) = engine.try_load::<serde_json::Value>() else {
        println!("[]");
        return Ok(());
    };
    let text = if pretty {
        serde_json::to_string_pretty(&snapshot)?
    } else {
        serde_json::to_string(&snapshot)?
    };
    println!("{text}");
    Ok(())
}

fn list_backups(engine: &Engine) {
    let rows: Vec<BackupRow> = engine
        .describe_backups()
        .into_iter()
        .map(|info| BackupRow {
            created: info
                .created
                .map(|time| format_timestamp(time.timestamp_millis()))
                .unwrap_or_else(|| "unknown".to_string()),
            size: format_size(info.size as u64),
            fingerprint: info.fingerprint.chars().take(12).collect(),
            key: info.key,
        })
        .collect();

    if rows.is_empty() {
        println!("No backups found");
    } else {
        println!("{}", Table::new(rows));
    }
}

fn check(engine: &Engine, size: usize) -> Result<(), anyhow::Error> {
    if !engine.is_available() {
        bail!("✗ Store at {} is not writable", engine.store().root().display());
    }
    println!("✓ Store is available");

    if engine.has_room(size) {
        println!("✓ Room for {}", format_size(size as u64));
        Ok(())
    } else {
        bail!("✗ Not enough room for {}", format_size(size as u64))
    }
}

fn clear(engine: &Engine, force: bool) -> Result<(), anyhow::Error> {
    if !force {
        print!(
            "Delete every record under namespace '{}'? (y/N): ",
            engine.config().namespace
        );
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().to_lowercase().starts_with('y') {
            println!("Clear cancelled");
            return Ok(());
        }
    }

    engine.clear();
    println!("✓ Store cleared");
    Ok(())
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_timestamp(millis: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_millis_opt(millis) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        _ => millis.to_string(),
    }
}

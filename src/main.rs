//! SpaceBadger: disk usage snapshots and growth tracking.
//!
//! Thin binary entry point. All logic lives in the `spacebadger-core`
//! crate; this file parses arguments, wires the store and the scan
//! orchestrator together, and prints results.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use spacebadger_core::analysis::{analyze_trend, compare_snapshots, ComparisonResult, TrendData};
use spacebadger_core::config::Config;
use spacebadger_core::model::size::{format_duration_ms, format_size, format_size_delta};
use spacebadger_core::model::{Snapshot, SnapshotMetadata};
use spacebadger_core::orchestrator::{
    Notification, NotificationSink, PersistingSink, ScanOrchestrator,
};
use spacebadger_core::store::{SnapshotPage, SnapshotStore};

/// Environment variable holding the log filter.
const LOG_ENV: &str = "SPACEBADGER_LOG";

/// Direct children listed by `show`.
const SHOW_CHILDREN: usize = 15;

#[derive(Debug, Parser)]
#[command(name = "spacebadger")]
#[command(about = "Scan directory trees, keep snapshots and compare them over time", long_about = None)]
struct Cli {
    /// Config file (defaults to $SPACEBADGER_CONFIG, then built-in defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scan a directory and save the result as a snapshot
    Scan {
        path: PathBuf,
        /// Extra basename or `*` glob to skip (repeatable)
        #[arg(long = "exclude", short = 'x')]
        exclude: Vec<String>,
        /// Print the result without saving it
        #[arg(long)]
        no_save: bool,
    },
    /// List saved snapshots, newest first
    List {
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show one snapshot and its largest top-level folders
    Show { id: String },
    /// Give a snapshot a name
    Rename { id: String, name: String },
    /// Delete a snapshot
    Delete { id: String },
    /// Compare two snapshots (A is the older one)
    Compare {
        id_a: String,
        id_b: String,
        /// Also write the changed paths to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// Size of one path across several snapshots
    Trend {
        path: String,
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Read or write a stored setting
    Setting {
        #[command(subcommand)]
        action: SettingAction,
    },
}

#[derive(Debug, Subcommand)]
enum SettingAction {
    Get { key: String },
    Set { key: String, value: String },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays machine readable.
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    tracing::debug!("Using database {}", config.database_path.display());

    match cli.command {
        Commands::Scan {
            path,
            exclude,
            no_save,
        } => run_scan(&config, path, &exclude, no_save, cli.json),
        Commands::List { limit, offset } => {
            let store = open_store(&config)?;
            let page = store.list_metadata(limit.unwrap_or(config.list.page_size), offset)?;
            if cli.json {
                print_json(&page)
            } else {
                print_page(&page);
                Ok(())
            }
        }
        Commands::Show { id } => {
            let store = open_store(&config)?;
            let Some(snapshot) = store.load_by_id(&id)? else {
                bail!("snapshot not found: {id}");
            };
            if cli.json {
                print_json(&snapshot)
            } else {
                print_snapshot(&snapshot);
                Ok(())
            }
        }
        Commands::Rename { id, name } => {
            open_store(&config)?.rename(&id, &name)?;
            Ok(())
        }
        Commands::Delete { id } => {
            open_store(&config)?.delete(&id)?;
            Ok(())
        }
        Commands::Compare { id_a, id_b, csv } => {
            let store = open_store(&config)?;
            let result = compare_snapshots(&store, &id_a, &id_b)?;
            if let Some(csv_path) = csv {
                let file = File::create(&csv_path)
                    .with_context(|| format!("creating {}", csv_path.display()))?;
                result.write_csv(BufWriter::new(file))?;
                tracing::info!("Wrote comparison to {}", csv_path.display());
            }
            if cli.json {
                print_json(&result)
            } else {
                print_comparison(&result);
                Ok(())
            }
        }
        Commands::Trend { path, ids } => {
            let store = open_store(&config)?;
            let trend = analyze_trend(&store, &ids, &path)?;
            if cli.json {
                print_json(&trend)
            } else {
                print_trend(&trend);
                Ok(())
            }
        }
        Commands::Setting { action } => {
            let store = open_store(&config)?;
            match action {
                SettingAction::Get { key } => match store.get_setting(&key)? {
                    Some(value) => println!("{value}"),
                    None => bail!("setting not set: {key}"),
                },
                SettingAction::Set { key, value } => store.set_setting(&key, &value)?,
            }
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<SnapshotStore> {
    SnapshotStore::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))
}

/// Run one scan in the foreground, streaming notifications to stdout.
fn run_scan(
    config: &Config,
    path: PathBuf,
    exclude: &[String],
    no_save: bool,
    json: bool,
) -> anyhow::Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded::<Notification>();
    let sink: Arc<dyn NotificationSink> = if no_save {
        Arc::new(tx)
    } else {
        Arc::new(PersistingSink::new(open_store(config)?.into_shared(), tx))
    };

    // Snapshots are keyed by absolute paths; a missing root is reported by
    // the scanner itself.
    let path = std::fs::canonicalize(&path).unwrap_or(path);
    let orchestrator = ScanOrchestrator::new(sink).with_scanner_config(&config.scanner);
    orchestrator.start(path, exclude)?;

    for notification in rx.iter() {
        if json {
            println!("{}", serde_json::to_string(&notification)?);
        }
        match notification {
            Notification::Progress(progress) => {
                if !json {
                    eprintln!(
                        "{:>5.1}%  {:>10}  {}",
                        progress.percentage,
                        format_size(progress.processed_size),
                        progress.current_path
                    );
                }
            }
            Notification::Complete { snapshot } => {
                if !json {
                    print_snapshot(&snapshot);
                }
                return Ok(());
            }
            Notification::Error { error, path } => match path {
                Some(path) => bail!("scan of {path} failed: {error}"),
                None => bail!("scan failed: {error}"),
            },
        }
    }
    bail!("scan ended without a result")
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_page(page: &SnapshotPage) {
    if page.snapshots.is_empty() {
        println!("No snapshots.");
        return;
    }
    for meta in &page.snapshots {
        println!("{}", metadata_line(meta));
    }
    println!("({} of {} snapshots)", page.snapshots.len(), page.total);
}

fn metadata_line(meta: &SnapshotMetadata) -> String {
    format!(
        "{}  {}  {:>10}  {}{}",
        meta.id,
        meta.created_at.format("%Y-%m-%d %H:%M"),
        format_size(meta.total_size),
        meta.scan_path,
        meta.name
            .as_deref()
            .map(|n| format!("  \"{n}\""))
            .unwrap_or_default()
    )
}

fn print_snapshot(snapshot: &Snapshot) {
    let meta = &snapshot.metadata;
    println!("{}", metadata_line(meta));
    println!(
        "{} files, {} folders, scanned in {}",
        meta.file_count,
        meta.folder_count,
        format_duration_ms(meta.scan_duration)
    );
    for child in snapshot.root_node.children_sorted_by_size().into_iter().take(SHOW_CHILDREN) {
        let marker = if child.is_accessible { "" } else { "  (inaccessible)" };
        println!("  {:>10}  {}{marker}", format_size(child.size), child.path);
    }
}

fn print_comparison(result: &ComparisonResult) {
    println!(
        "{} -> {}: {} over {} days",
        result.snapshot_a.id,
        result.snapshot_b.id,
        format_size_delta(result.total_diff),
        result.days_between
    );
    for (title, items) in [("Growing", &result.top_growing), ("Shrinking", &result.top_shrinking)] {
        if items.is_empty() {
            continue;
        }
        println!("{title}:");
        for item in items {
            println!(
                "  {:>11}  {:>8.1}%  {:<8}  {}",
                format_size_delta(item.diff),
                item.diff_percent,
                item.status.label(),
                item.path
            );
        }
    }
}

fn print_trend(trend: &TrendData) {
    println!("{}", trend.path);
    for point in &trend.points {
        println!(
            "  {}  {:>10}",
            point.date.format("%Y-%m-%d %H:%M"),
            format_size(point.size)
        );
    }
}

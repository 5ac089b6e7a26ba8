/// Two-snapshot diff.
///
/// Every folder at every depth is compared by path. Paths whose size is the
/// same on both sides produce nothing; the rest are classified, and the
/// largest movers in each direction are kept.
use crate::error::{Result, Side, SpaceBadgerError};
use crate::model::{Snapshot, SnapshotMetadata};
use crate::store::SnapshotStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use tracing::info;

/// Items kept in each of `top_growing` and `top_shrinking`.
pub const TOP_N: usize = 20;

const MS_PER_DAY: u64 = 24 * 60 * 60 * 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffStatus {
    /// Absent (or empty) in A.
    New,
    /// Absent (or empty) in B.
    Deleted,
    Modified,
}

impl DiffStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Deleted => "deleted",
            Self::Modified => "modified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffItem {
    pub path: String,
    pub size_a: u64,
    pub size_b: u64,
    /// `size_b - size_a`.
    pub diff: i64,
    /// Relative to `size_a`; a flat 100 when `size_a` is 0.
    pub diff_percent: f64,
    pub status: DiffStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub snapshot_a: SnapshotMetadata,
    pub snapshot_b: SnapshotMetadata,
    /// From the snapshots' stored totals, not from the items below.
    pub total_diff: i64,
    pub days_between: u64,
    pub top_growing: Vec<DiffItem>,
    pub top_shrinking: Vec<DiffItem>,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    path: &'a str,
    size_a: u64,
    size_b: u64,
    diff: i64,
    diff_percent: f64,
    status: &'static str,
}

impl ComparisonResult {
    /// Write growing then shrinking items as CSV with a header row.
    pub fn write_csv<W: Write>(&self, out: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        for item in self.top_growing.iter().chain(&self.top_shrinking) {
            wtr.serialize(CsvRow {
                path: &item.path,
                size_a: item.size_a,
                size_b: item.size_b,
                diff: item.diff,
                diff_percent: item.diff_percent,
                status: item.status.label(),
            })?;
        }
        wtr.flush()
            .map_err(|err| SpaceBadgerError::Serialization {
                context: "csv",
                details: err.to_string(),
            })?;
        Ok(())
    }
}

/// Load two snapshots and diff them. A is looked up before B.
pub fn compare_snapshots(store: &SnapshotStore, id_a: &str, id_b: &str) -> Result<ComparisonResult> {
    info!("Comparing snapshots {id_a} and {id_b}");

    let snapshot_a = store.load_by_id(id_a)?.ok_or_else(|| SpaceBadgerError::NotFound {
        side: Side::A,
        id: id_a.to_string(),
    })?;
    let snapshot_b = store.load_by_id(id_b)?.ok_or_else(|| SpaceBadgerError::NotFound {
        side: Side::B,
        id: id_b.to_string(),
    })?;

    Ok(compare(&snapshot_a, &snapshot_b))
}

/// Diff two loaded snapshots.
pub fn compare(snapshot_a: &Snapshot, snapshot_b: &Snapshot) -> ComparisonResult {
    let sizes_a = path_sizes(snapshot_a);
    let sizes_b = path_sizes(snapshot_b);

    let paths: HashSet<&str> = sizes_a.keys().chain(sizes_b.keys()).copied().collect();
    let mut growing = Vec::new();
    let mut shrinking = Vec::new();

    for path in paths {
        let size_a = sizes_a.get(path).copied().unwrap_or(0);
        let size_b = sizes_b.get(path).copied().unwrap_or(0);
        if size_a == size_b {
            continue;
        }
        let item = diff_item(path, size_a, size_b);
        if item.diff > 0 {
            growing.push(item);
        } else {
            shrinking.push(item);
        }
    }
    let changed = growing.len() + shrinking.len();

    // Path breaks ties so the cut at TOP_N is deterministic.
    growing.sort_unstable_by(|a, b| b.diff.cmp(&a.diff).then_with(|| a.path.cmp(&b.path)));
    growing.truncate(TOP_N);
    shrinking.sort_unstable_by(|a, b| a.diff.cmp(&b.diff).then_with(|| a.path.cmp(&b.path)));
    shrinking.truncate(TOP_N);

    let meta_a = &snapshot_a.metadata;
    let meta_b = &snapshot_b.metadata;
    let total_diff = signed(meta_b.total_size).saturating_sub(signed(meta_a.total_size));
    let days_between = days_between(meta_a.created_at, meta_b.created_at);

    info!(
        "Comparison complete: {changed} changed paths, {} growing, {} shrinking",
        growing.len(),
        shrinking.len()
    );

    ComparisonResult {
        snapshot_a: meta_a.clone(),
        snapshot_b: meta_b.clone(),
        total_diff,
        days_between,
        top_growing: growing,
        top_shrinking: shrinking,
    }
}

fn diff_item(path: &str, size_a: u64, size_b: u64) -> DiffItem {
    let diff = signed(size_b).saturating_sub(signed(size_a));
    let diff_percent = if size_a > 0 {
        diff as f64 / size_a as f64 * 100.0
    } else {
        100.0
    };
    let status = if size_a == 0 {
        DiffStatus::New
    } else if size_b == 0 {
        DiffStatus::Deleted
    } else {
        DiffStatus::Modified
    };

    DiffItem {
        path: path.to_string(),
        size_a,
        size_b,
        diff,
        diff_percent,
        status,
    }
}

fn path_sizes(snapshot: &Snapshot) -> HashMap<&str, u64> {
    snapshot
        .root_node
        .iter()
        .map(|node| (node.path.as_str(), node.size))
        .collect()
}

/// Whole days between two instants, rounded up.
pub fn days_between(a: DateTime<Utc>, b: DateTime<Utc>) -> u64 {
    let ms = (b - a).num_milliseconds().unsigned_abs();
    ms.div_ceil(MS_PER_DAY)
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

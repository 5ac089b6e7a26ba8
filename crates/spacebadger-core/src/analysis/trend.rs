/// Size of one path across several snapshots.
use crate::error::{Result, SpaceBadgerError};
use crate::model::Snapshot;
use crate::store::SnapshotStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendDataPoint {
    pub date: DateTime<Utc>,
    /// 0 if the path did not exist in that snapshot.
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendData {
    pub path: String,
    /// Oldest first.
    pub points: Vec<TrendDataPoint>,
}

/// Load each snapshot and extract the size of `target_path`.
///
/// Ids that do not resolve are skipped. Input order does not matter.
pub fn analyze_trend(store: &SnapshotStore, ids: &[String], target_path: &str) -> Result<TrendData> {
    if ids.is_empty() {
        return Err(SpaceBadgerError::InvalidInput {
            details: "snapshot id list cannot be empty".into(),
        });
    }
    info!("Analyzing trend for {target_path} across {} snapshots", ids.len());

    let mut snapshots = Vec::with_capacity(ids.len());
    for id in ids {
        match store.load_by_id(id)? {
            Some(snapshot) => snapshots.push(snapshot),
            None => warn!("Trend: snapshot not found: {id}, skipping"),
        }
    }

    let trend = trend_of(&snapshots, target_path);
    info!("Trend analysis complete: {} points", trend.points.len());
    Ok(trend)
}

/// Extract the trend from already loaded snapshots.
pub fn trend_of(snapshots: &[Snapshot], target_path: &str) -> TrendData {
    let mut points: Vec<TrendDataPoint> = snapshots
        .iter()
        .map(|snapshot| TrendDataPoint {
            date: snapshot.created_at(),
            size: snapshot.root_node.find(target_path).map_or(0, |node| node.size),
        })
        .collect();
    points.sort_by_key(|p| p.date);

    TrendData {
        path: target_path.to_string(),
        points,
    }
}

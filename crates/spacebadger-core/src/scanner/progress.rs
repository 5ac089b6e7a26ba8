/// Messages sent from the scan thread to whoever owns the [`ScanHandle`].
///
/// One scan produces zero or more `Progress` messages followed by exactly
/// one `Complete` or `Error`. A cancelled scan produces no terminal message.
///
/// [`ScanHandle`]: super::ScanHandle
use crate::model::FolderNode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Throttled progress telemetry. All figures are estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanProgress {
    /// Folder that just finished.
    pub current_path: String,
    /// Bytes of files stat'd so far.
    pub processed_size: u64,
    /// 0–95 while scanning; 100 is implied by completion.
    pub percentage: f64,
    pub processed_folders: u64,
    /// Bytes per second since the scan started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Milliseconds, extrapolated from the percentage. Absent until the
    /// percentage exceeds 5.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
}

/// Result of a completed walk. Counts come from the reduced tree, not from
/// the advisory progress counters.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub root_node: FolderNode,
    pub scan_duration: Duration,
    pub total_files: u64,
    /// Root plus every descendant folder.
    pub total_folders: u64,
    /// Directories whose listing failed.
    pub inaccessible_paths: Vec<String>,
}

#[derive(Debug)]
pub enum ScanMessage {
    Progress(ScanProgress),
    Complete(Box<ScanOutcome>),
    /// The scan could not run at all (missing root, not a directory, ...).
    Error {
        error: String,
        path: Option<String>,
    },
}

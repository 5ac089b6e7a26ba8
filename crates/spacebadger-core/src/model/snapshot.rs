/// Point-in-time records of a completed scan.
use super::FolderNode;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Everything about a snapshot except its tree. Cheap to list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub id: String,
    /// User-assigned label; `None` until renamed.
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scan_path: String,
    pub total_size: u64,
    pub file_count: u64,
    /// Root plus every descendant folder.
    pub folder_count: u64,
    /// Scan wall time in milliseconds.
    pub scan_duration: u64,
}

/// A full snapshot: metadata plus the owned folder tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(flatten)]
    pub metadata: SnapshotMetadata,
    pub root_node: FolderNode,
}

impl Snapshot {
    /// Materialise a snapshot from a finished scan, stamping a fresh id and
    /// the current time.
    pub fn from_scan(
        scan_path: impl Into<String>,
        root_node: FolderNode,
        file_count: u64,
        folder_count: u64,
        scan_duration: Duration,
    ) -> Self {
        Self {
            metadata: SnapshotMetadata {
                id: Uuid::new_v4().to_string(),
                name: None,
                // Stored with millisecond precision.
                created_at: Utc::now().trunc_subsecs(3),
                scan_path: scan_path.into(),
                total_size: root_node.size,
                file_count,
                folder_count,
                scan_duration: u64::try_from(scan_duration.as_millis()).unwrap_or(u64::MAX),
            },
            root_node,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.metadata.created_at
    }
}

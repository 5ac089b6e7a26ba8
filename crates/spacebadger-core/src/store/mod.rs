/// SQLite snapshot store.
///
/// One metadata row per snapshot in `snapshots`, one row per folder in
/// `folder_nodes` (parent pointer plus depth), and a small `settings`
/// key/value table. Foreign keys are enabled so deleting a snapshot removes
/// its folder rows. Sizes are stored as SQLite integers (i64), saturating
/// at `i64::MAX`.
use crate::error::{Result, SpaceBadgerError};
use crate::model::{flatten, reconstruct, FlatFolderNode, Snapshot, SnapshotMetadata};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Store handle shared between the orchestrator's sink and callers.
///
/// The sink locks it on the forwarding thread while saving. Holding it
/// across `ScanOrchestrator::cancel` is fine; holding it while waiting for
/// a terminal notification is not.
pub type SharedStore = Arc<Mutex<SnapshotStore>>;

/// One page of snapshot metadata plus the total number of snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotPage {
    pub snapshots: Vec<SnapshotMetadata>,
    pub total: u64,
}

pub struct SnapshotStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SnapshotStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| SpaceBadgerError::io(parent, err))?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(SpaceBadgerError::sql("open database"))?;

        apply_pragmas(&conn, true)?;
        apply_schema(&conn)?;
        info!("Opened snapshot store at {}", path.display());

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// A private, non-persistent store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(SpaceBadgerError::sql("open database"))?;
        apply_pragmas(&conn, false)?;
        apply_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Database file, or `None` for an in-memory store.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Wrap this store for sharing across threads.
    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    // ──────────────────── snapshots ────────────────────

    /// Persist a snapshot and its whole tree in one transaction.
    ///
    /// Fails, writing nothing, if a snapshot with the same id exists.
    pub fn save(&mut self, snapshot: &Snapshot) -> Result<()> {
        let meta = &snapshot.metadata;
        let rows = flatten(&snapshot.root_node, &meta.id);

        let tx = self
            .conn
            .transaction()
            .map_err(SpaceBadgerError::sql("begin save"))?;
        tx.prepare_cached(
            "INSERT INTO snapshots (
                id, name, created_at, scan_path, total_size,
                file_count, folder_count, scan_duration
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        )
        .and_then(|mut stmt| {
            stmt.execute(params![
                meta.id,
                meta.name,
                format_timestamp(meta.created_at),
                meta.scan_path,
                to_sql_int(meta.total_size),
                to_sql_int(meta.file_count),
                to_sql_int(meta.folder_count),
                to_sql_int(meta.scan_duration),
            ])
        })
        .map_err(SpaceBadgerError::sql("insert snapshot"))?;

        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO folder_nodes (
                        snapshot_id, path, name, size, file_count,
                        parent_path, depth, is_accessible
                    ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
                )
                .map_err(SpaceBadgerError::sql("insert folder rows"))?;
            for row in &rows {
                stmt.execute(params![
                    row.snapshot_id,
                    row.path,
                    row.name.as_str(),
                    to_sql_int(row.size),
                    to_sql_int(row.file_count),
                    row.parent_path,
                    row.depth,
                    row.is_accessible,
                ])
                .map_err(SpaceBadgerError::sql("insert folder rows"))?;
            }
        }

        tx.commit().map_err(SpaceBadgerError::sql("commit save"))?;
        debug!("Saved snapshot {} with {} folder rows", meta.id, rows.len());
        Ok(())
    }

    /// Snapshot metadata, newest first, without loading any tree.
    pub fn list_metadata(&self, limit: u32, offset: u32) -> Result<SnapshotPage> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT id, name, created_at, scan_path, total_size,
                        file_count, folder_count, scan_duration
                 FROM snapshots ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
            )
            .map_err(SpaceBadgerError::sql("list snapshots"))?;
        let snapshots = stmt
            .query_map(params![limit, offset], metadata_from_row)
            .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
            .map_err(SpaceBadgerError::sql("list snapshots"))?;

        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))
            .map_err(SpaceBadgerError::sql("count snapshots"))?;

        Ok(SnapshotPage {
            snapshots,
            total: from_sql_int(total),
        })
    }

    /// Load a full snapshot. `None` if the id is unknown or its tree has no
    /// root row.
    pub fn load_by_id(&self, id: &str) -> Result<Option<Snapshot>> {
        let Some(metadata) = self.load_metadata(id)? else {
            warn!("Snapshot not found: {id}");
            return Ok(None);
        };

        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT snapshot_id, path, name, size, file_count,
                        parent_path, depth, is_accessible
                 FROM folder_nodes WHERE snapshot_id = ?1
                 ORDER BY depth ASC, path ASC",
            )
            .map_err(SpaceBadgerError::sql("load folder rows"))?;
        let rows = stmt
            .query_map(params![id], flat_node_from_row)
            .and_then(|rows| rows.collect::<std::result::Result<Vec<_>, _>>())
            .map_err(SpaceBadgerError::sql("load folder rows"))?;

        let row_count = rows.len();
        let Some(root_node) = reconstruct(rows) else {
            error!("Snapshot {id} has no root folder row ({row_count} rows)");
            return Ok(None);
        };
        debug!("Loaded snapshot {id} from {row_count} folder rows");

        Ok(Some(Snapshot {
            metadata,
            root_node,
        }))
    }

    /// Metadata only, or `None` if the id is unknown.
    pub fn load_metadata(&self, id: &str) -> Result<Option<SnapshotMetadata>> {
        self.conn
            .prepare_cached(
                "SELECT id, name, created_at, scan_path, total_size,
                        file_count, folder_count, scan_duration
                 FROM snapshots WHERE id = ?1",
            )
            .and_then(|mut stmt| stmt.query_row(params![id], metadata_from_row).optional())
            .map_err(SpaceBadgerError::sql("load snapshot"))
    }

    /// Delete a snapshot and all of its folder rows.
    pub fn delete(&self, id: &str) -> Result<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM snapshots WHERE id = ?1", params![id])
            .map_err(SpaceBadgerError::sql("delete snapshot"))?;
        if deleted == 0 {
            warn!("Delete: snapshot not found: {id}");
        } else {
            info!("Deleted snapshot {id}");
        }
        Ok(())
    }

    /// Set the user-facing name of a snapshot.
    pub fn rename(&self, id: &str, name: &str) -> Result<()> {
        let updated = self
            .conn
            .execute(
                "UPDATE snapshots SET name = ?1 WHERE id = ?2",
                params![name, id],
            )
            .map_err(SpaceBadgerError::sql("rename snapshot"))?;
        if updated == 0 {
            warn!("Rename: snapshot not found: {id}");
        } else {
            info!("Renamed snapshot {id} to {name:?}");
        }
        Ok(())
    }

    // ──────────────────── settings ────────────────────

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .prepare_cached("SELECT value FROM settings WHERE key = ?1")
            .and_then(|mut stmt| stmt.query_row(params![key], |row| row.get(0)).optional())
            .map_err(SpaceBadgerError::sql("get setting"))
    }

    /// Insert or replace a setting.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO settings (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )
            .and_then(|mut stmt| stmt.execute(params![key, value]))
            .map_err(SpaceBadgerError::sql("set setting"))?;
        Ok(())
    }

    #[cfg(test)]
    fn folder_row_count(&self, id: &str) -> i64 {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM folder_nodes WHERE snapshot_id = ?1",
                params![id],
                |row| row.get(0),
            )
            .unwrap()
    }
}

// ──────────────────── row mapping ────────────────────

fn metadata_from_row(row: &Row<'_>) -> rusqlite::Result<SnapshotMetadata> {
    let created_at: String = row.get(2)?;
    Ok(SnapshotMetadata {
        id: row.get(0)?,
        name: row.get(1)?,
        created_at: parse_timestamp(2, &created_at)?,
        scan_path: row.get(3)?,
        total_size: from_sql_int(row.get(4)?),
        file_count: from_sql_int(row.get(5)?),
        folder_count: from_sql_int(row.get(6)?),
        scan_duration: from_sql_int(row.get(7)?),
    })
}

fn flat_node_from_row(row: &Row<'_>) -> rusqlite::Result<FlatFolderNode> {
    let name: String = row.get(2)?;
    Ok(FlatFolderNode {
        snapshot_id: row.get(0)?,
        path: row.get(1)?,
        name: name.into(),
        size: from_sql_int(row.get(3)?),
        file_count: from_sql_int(row.get(4)?),
        parent_path: row.get(5)?,
        depth: row.get(6)?,
        is_accessible: row.get(7)?,
    })
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err)))
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

// ──────────────────── schema ────────────────────

fn apply_pragmas(conn: &Connection, on_disk: bool) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;",
    )
    .map_err(SpaceBadgerError::sql("apply pragmas"))?;

    if on_disk {
        let mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .map_err(SpaceBadgerError::sql("apply pragmas"))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!("Requested WAL journal mode but got '{mode}'");
        }
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS snapshots (
            id TEXT PRIMARY KEY,
            name TEXT,
            created_at TEXT NOT NULL,
            scan_path TEXT NOT NULL,
            total_size INTEGER NOT NULL,
            file_count INTEGER NOT NULL,
            folder_count INTEGER NOT NULL,
            scan_duration INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS folder_nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            snapshot_id TEXT NOT NULL REFERENCES snapshots(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            name TEXT NOT NULL,
            size INTEGER NOT NULL,
            file_count INTEGER NOT NULL,
            parent_path TEXT,
            depth INTEGER NOT NULL,
            is_accessible INTEGER NOT NULL DEFAULT 1,
            UNIQUE (snapshot_id, path)
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_folder_snapshot ON folder_nodes(snapshot_id);
        CREATE INDEX IF NOT EXISTS idx_folder_path ON folder_nodes(path);
        CREATE INDEX IF NOT EXISTS idx_snapshots_created ON snapshots(created_at DESC);",
    )
    .map_err(SpaceBadgerError::sql("apply schema"))?;
    Ok(())
}

// ──────────────────── tests ────────────────────

/// End-to-end tests of the scan → save → compare/trend pipeline.
///
/// Scans run through `ScanOrchestrator` on real temporary directories and
/// are persisted to a real SQLite file, then read back by the analysis
/// engines.
use crossbeam_channel::{Receiver, RecvTimeoutError};
use spacebadger_core::analysis::{analyze_trend, compare_snapshots, DiffStatus};
use spacebadger_core::model::Snapshot;
use spacebadger_core::orchestrator::{Notification, PersistingSink, ScanOrchestrator};
use spacebadger_core::store::{SharedStore, SnapshotStore};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

// ── Helpers ──────────────────────────────────────────────────────────────────

fn write_bytes(path: &Path, n: usize) {
    let mut f = fs::File::create(path).unwrap();
    f.write_all(&vec![0u8; n]).unwrap();
}

struct Harness {
    store: SharedStore,
    orchestrator: ScanOrchestrator,
    rx: Receiver<Notification>,
    _db_dir: TempDir,
}

fn harness() -> Harness {
    let db_dir = TempDir::new().expect("failed to create temp dir");
    let store = SnapshotStore::open(&db_dir.path().join("snapshots.db"))
        .unwrap()
        .into_shared();
    let (tx, rx) = crossbeam_channel::unbounded();
    let sink = PersistingSink::new(store.clone(), tx);
    Harness {
        store,
        orchestrator: ScanOrchestrator::new(Arc::new(sink)),
        rx,
        _db_dir: db_dir,
    }
}

/// Skip progress and return the next terminal notification.
fn next_terminal(rx: &Receiver<Notification>) -> Notification {
    loop {
        match rx.recv_timeout(Duration::from_secs(30)) {
            Ok(Notification::Progress(p)) => assert!(p.percentage <= 95.0),
            Ok(terminal) => return terminal,
            Err(RecvTimeoutError::Timeout) => panic!("no terminal notification within 30 seconds"),
            Err(RecvTimeoutError::Disconnected) => panic!("notification channel closed"),
        }
    }
}

fn scan(h: &Harness, root: &Path) -> Snapshot {
    h.orchestrator.start(root, &[]).unwrap();
    match next_terminal(&h.rx) {
        Notification::Complete { snapshot } => snapshot,
        other => panic!("expected Complete, got {other:?}"),
    }
}

// ── Orchestrator ─────────────────────────────────────────────────────────────

#[test]
fn completed_scan_is_saved_and_reported() {
    let h = harness();
    let tmp = TempDir::new().expect("failed to create temp dir");
    fs::create_dir(tmp.path().join("sub")).unwrap();
    write_bytes(&tmp.path().join("sub").join("a.bin"), 700);
    write_bytes(&tmp.path().join("b.bin"), 300);

    let snapshot = scan(&h, tmp.path());
    assert!(!h.orchestrator.is_scanning());

    let meta = &snapshot.metadata;
    assert_eq!(meta.scan_path, tmp.path().to_string_lossy());
    assert_eq!(meta.total_size, 1_000);
    assert_eq!(meta.file_count, 2);
    assert_eq!(meta.folder_count, 2);
    assert!(meta.name.is_none());

    let mut stored = h.store.lock().load_by_id(snapshot.id()).unwrap().expect("saved");
    let mut expected = snapshot.clone();
    stored.root_node.sort_by_path();
    expected.root_node.sort_by_path();
    assert_eq!(stored, expected);
}

#[test]
fn missing_root_is_an_error_notification() {
    let h = harness();
    let tmp = TempDir::new().expect("failed to create temp dir");
    let missing = tmp.path().join("gone");

    h.orchestrator.start(&missing, &[]).unwrap();
    match next_terminal(&h.rx) {
        Notification::Error { error, path } => {
            assert!(!error.is_empty());
            assert_eq!(path.as_deref(), Some(&*missing.to_string_lossy()));
        }
        other => panic!("expected Error, got {other:?}"),
    }
    assert!(!h.orchestrator.is_scanning());
    assert_eq!(h.store.lock().list_metadata(10, 0).unwrap().total, 0);
}

#[test]
fn nothing_is_notified_after_cancel() {
    let h = harness();
    let tmp = TempDir::new().expect("failed to create temp dir");
    for i in 0..200 {
        let dir = tmp.path().join(format!("d{i}"));
        fs::create_dir(&dir).unwrap();
        write_bytes(&dir.join("f"), 10);
    }

    h.orchestrator.start(tmp.path(), &[]).unwrap();
    h.orchestrator.cancel();
    assert!(!h.orchestrator.is_scanning());

    // Anything forwarded before cancel() returned is already queued.
    let _before: Vec<Notification> = h.rx.try_iter().collect();
    thread::sleep(Duration::from_millis(500));
    assert!(h.rx.try_recv().is_err(), "notification arrived after cancel");
}

#[test]
fn new_scan_supersedes_the_running_one() {
    let h = harness();
    let first = TempDir::new().expect("failed to create temp dir");
    let second = TempDir::new().expect("failed to create temp dir");
    for i in 0..20 {
        fs::create_dir(first.path().join(format!("d{i}"))).unwrap();
    }
    write_bytes(&second.path().join("only.bin"), 42);

    h.orchestrator.start(first.path(), &[]).unwrap();
    h.orchestrator.start(second.path(), &[]).unwrap();
    // `None` only if the second scan already finished.
    if let Some(current) = h.orchestrator.current_scan_path() {
        assert_eq!(current, second.path().to_string_lossy());
    }

    // The first scan may have finished before it was superseded; skip it.
    let second_path = second.path().to_string_lossy().into_owned();
    let snapshot = loop {
        match next_terminal(&h.rx) {
            Notification::Complete { snapshot } if snapshot.metadata.scan_path == second_path => {
                break snapshot
            }
            Notification::Complete { .. } => continue,
            other => panic!("unexpected {other:?}"),
        }
    };
    assert_eq!(snapshot.metadata.total_size, 42);

    thread::sleep(Duration::from_millis(300));
    assert!(h.rx.try_recv().is_err());
    assert!(!h.orchestrator.is_scanning());
}

#[cfg(target_os = "linux")]
#[test]
fn non_utf8_sibling_names_still_save() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let h = harness();
    let tmp = TempDir::new().expect("failed to create temp dir");
    for name in [b"\xff".as_slice(), b"\xfe".as_slice()] {
        let dir = tmp.path().join(OsStr::from_bytes(name));
        fs::create_dir(&dir).unwrap();
        write_bytes(&dir.join("f"), 10);
    }

    let snapshot = scan(&h, tmp.path());
    assert_eq!(snapshot.metadata.folder_count, 2);
    assert!(h.store.lock().load_by_id(snapshot.id()).unwrap().is_some());
}

// ── Comparison and trend over saved snapshots ───────────────────────────────

#[test]
fn growth_between_scans_is_detected() {
    let h = harness();
    let tmp = TempDir::new().expect("failed to create temp dir");
    let logs = tmp.path().join("logs");
    let cache = tmp.path().join("cache");
    fs::create_dir(&logs).unwrap();
    fs::create_dir(&cache).unwrap();
    write_bytes(&logs.join("app.log"), 1_000);
    write_bytes(&cache.join("blob"), 1_000);

    let before = scan(&h, tmp.path());

    write_bytes(&logs.join("app.log.1"), 800);
    fs::remove_file(cache.join("blob")).unwrap();
    write_bytes(&cache.join("blob"), 700);
    let media = tmp.path().join("media");
    fs::create_dir(&media).unwrap();
    write_bytes(&media.join("clip"), 500);

    // Timestamps are kept to the millisecond.
    thread::sleep(Duration::from_millis(20));
    let after = scan(&h, tmp.path());

    let store = h.store.lock();
    let result = compare_snapshots(&store, before.id(), after.id()).unwrap();
    assert_eq!(result.total_diff, 1_000);
    assert_eq!(result.days_between, 1);

    let logs_path = logs.to_string_lossy();
    let grown = result.top_growing.iter().find(|i| i.path == logs_path).unwrap();
    assert_eq!(grown.diff, 800);
    assert_eq!(grown.diff_percent, 80.0);
    assert_eq!(grown.status, DiffStatus::Modified);

    let media_path = media.to_string_lossy();
    let added = result.top_growing.iter().find(|i| i.path == media_path).unwrap();
    assert_eq!(added.status, DiffStatus::New);
    assert_eq!(added.diff_percent, 100.0);

    let cache_path = cache.to_string_lossy();
    let shrunk = result.top_shrinking.iter().find(|i| i.path == cache_path).unwrap();
    assert_eq!(shrunk.diff, -300);
    assert_eq!(shrunk.diff_percent, -30.0);

    let trend = analyze_trend(
        &store,
        &[after.id().to_string(), before.id().to_string()],
        &media_path,
    )
    .unwrap();
    let sizes: Vec<u64> = trend.points.iter().map(|p| p.size).collect();
    assert_eq!(sizes, [0, 500]);
}

#[test]
fn deleting_a_snapshot_removes_it_everywhere() {
    let h = harness();
    let tmp = TempDir::new().expect("failed to create temp dir");
    fs::create_dir_all(tmp.path().join("a").join("b")).unwrap();

    let snapshot = scan(&h, tmp.path());
    let store = h.store.lock();
    store.rename(snapshot.id(), "baseline").unwrap();
    assert_eq!(
        store.list_metadata(10, 0).unwrap().snapshots[0].name.as_deref(),
        Some("baseline")
    );

    store.delete(snapshot.id()).unwrap();
    assert!(store.load_by_id(snapshot.id()).unwrap().is_none());
    let err = compare_snapshots(&store, snapshot.id(), snapshot.id()).unwrap_err();
    assert!(err.is_not_found());
}

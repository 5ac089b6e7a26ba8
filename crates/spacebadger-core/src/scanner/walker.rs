/// Concurrent recursive directory walker.
///
/// Every entry of a directory becomes its own rayon task: subdirectories
/// recurse, files and symlinks are stat'd. The directory finishes only when
/// all of those tasks have joined, and the join is where their sizes are
/// folded into the parent. The pool is dedicated to one scan and sized from
/// the config, which bounds how many tasks do I/O at once.
///
/// Below [`PARALLEL_DEPTH`] a subtree is walked by a single task with an
/// explicit stack, so arbitrarily deep trees never grow the thread stack.
///
/// Failure handling is per node:
/// - listing fails: node marked inaccessible, path recorded, subtree empty;
/// - file stat fails (including broken symlinks): entry skipped;
/// - child recursion fails: child omitted, parent continues.
use super::exclude::ExcludeMatcher;
use super::progress::{ScanMessage, ScanOutcome};
use super::telemetry::ProgressTracker;
use crate::error::{Result, SpaceBadgerError};
use crate::model::FolderNode;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use rayon::prelude::*;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Directories at this depth or deeper are walked sequentially.
pub const PARALLEL_DEPTH: u32 = 64;

/// Stack size of scan pool threads. Nested parallel levels plus work
/// stealing need more than the 2 MiB default.
pub const SCAN_THREAD_STACK_SIZE: usize = 32 * 1024 * 1024;

/// What to scan and how.
#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub root_path: PathBuf,
    /// Extra patterns; the built-in defaults are always applied.
    pub exclude_patterns: Vec<String>,
    /// Scan pool size; 0 means one thread per CPU.
    pub threads: usize,
}

impl ScanRequest {
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self {
            root_path: root_path.into(),
            exclude_patterns: Vec::new(),
            threads: 0,
        }
    }

    #[must_use]
    pub fn with_excludes<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

/// Why a subtree produced no node.
#[derive(Debug)]
enum WalkError {
    Cancelled,
}

/// Contribution of one directory entry to its parent.
enum Entry {
    File(u64),
    Folder(FolderNode),
}

/// A directory on the sequential walk's stack, waiting for its subdirectories.
struct OpenDir {
    node: FolderNode,
    /// Remaining subdirectories, popped from the back.
    subdirs: Vec<PathBuf>,
    depth: u32,
}

struct Walker<'a> {
    excludes: ExcludeMatcher,
    tracker: &'a ProgressTracker,
    cancel: &'a AtomicBool,
    inaccessible: Mutex<Vec<String>>,
}

impl Walker<'_> {
    fn scan_directory(&self, path: &Path, depth: u32) -> std::result::Result<FolderNode, WalkError> {
        if depth >= PARALLEL_DEPTH {
            return self.scan_sequential(path, depth);
        }
        if self.cancel.load(Ordering::Relaxed) {
            return Err(WalkError::Cancelled);
        }

        let path_str = path.to_string_lossy().into_owned();
        let entries = match self.list(path, &path_str) {
            Ok(entries) => entries,
            Err(err) => return Ok(self.mark_inaccessible(path_str, &err)),
        };

        let contributions: Vec<Entry> = entries
            .into_par_iter()
            .with_max_len(1)
            .filter_map(|entry| self.visit_entry(&entry, depth))
            .collect();

        let mut node = FolderNode::new(path_str);
        for contribution in contributions {
            match contribution {
                Entry::File(bytes) => {
                    node.size += bytes;
                    node.file_count += 1;
                }
                Entry::Folder(child) => adopt(&mut node, child),
            }
        }

        self.tracker.folder_done(&node.path, depth);
        Ok(node)
    }

    /// Walk a subtree on the current task without recursion.
    fn scan_sequential(&self, path: &Path, depth: u32) -> std::result::Result<FolderNode, WalkError> {
        let mut root = self.open_dir(path, depth)?;
        let mut stack: Vec<OpenDir> = Vec::new();

        loop {
            let top = stack.last_mut().unwrap_or(&mut root);
            let child_depth = top.depth + 1;
            let next = top.subdirs.pop();

            match next {
                Some(dir) => {
                    let child = self.open_dir(&dir, child_depth)?;
                    stack.push(child);
                }
                None => match stack.pop() {
                    Some(done) => {
                        self.tracker.folder_done(&done.node.path, done.depth);
                        let parent = stack.last_mut().unwrap_or(&mut root);
                        adopt(&mut parent.node, done.node);
                    }
                    None => break,
                },
            }
        }

        self.tracker.folder_done(&root.node.path, root.depth);
        Ok(root.node)
    }

    /// List `path` and sum its files; subdirectories are left for the caller.
    fn open_dir(&self, path: &Path, depth: u32) -> std::result::Result<OpenDir, WalkError> {
        if self.cancel.load(Ordering::Relaxed) {
            return Err(WalkError::Cancelled);
        }

        let path_str = path.to_string_lossy().into_owned();
        let entries = match self.list(path, &path_str) {
            Ok(entries) => entries,
            Err(err) => {
                return Ok(OpenDir {
                    node: self.mark_inaccessible(path_str, &err),
                    subdirs: Vec::new(),
                    depth,
                })
            }
        };

        let mut node = FolderNode::new(path_str);
        let mut subdirs = Vec::new();
        for entry in entries {
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                self.tracker.folder_discovered();
                subdirs.push(entry.path());
            } else if let Some(bytes) = self.file_size(&entry, file_type) {
                node.size += bytes;
                node.file_count += 1;
            }
        }
        // Popped from the back, so children are visited in listing order.
        subdirs.reverse();

        Ok(OpenDir {
            node,
            subdirs,
            depth,
        })
    }

    /// Directory entries of `path` minus exclusions.
    fn list(&self, path: &Path, path_str: &str) -> std::io::Result<Vec<fs::DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            match entry {
                Ok(entry) => {
                    let name = entry.file_name();
                    if self.excludes.is_excluded(&name.to_string_lossy()) {
                        continue;
                    }
                    entries.push(entry);
                }
                Err(err) => debug!("Skipping unreadable entry in {path_str}: {err}"),
            }
        }
        Ok(entries)
    }

    fn visit_entry(&self, entry: &fs::DirEntry, depth: u32) -> Option<Entry> {
        let file_type = entry.file_type().ok()?;

        if file_type.is_dir() {
            let child_path = entry.path();
            self.tracker.folder_discovered();
            match self.scan_directory(&child_path, depth + 1) {
                Ok(child) => Some(Entry::Folder(child)),
                Err(err) => {
                    debug!("Failed to scan subdirectory {}: {err:?}", child_path.display());
                    None
                }
            }
        } else {
            self.file_size(entry, file_type).map(Entry::File)
        }
    }

    /// Size of a file, or of a symlink's target. Symlinks are never
    /// descended into, but their target is stat'd; broken links are skipped.
    fn file_size(&self, entry: &fs::DirEntry, file_type: fs::FileType) -> Option<u64> {
        let meta = if file_type.is_symlink() {
            fs::metadata(entry.path())
        } else if file_type.is_file() {
            entry.metadata()
        } else {
            return None;
        };
        // Vanished or unreadable files are expected mid-scan.
        let bytes = meta.ok()?.len();
        self.tracker.add_bytes(bytes);
        Some(bytes)
    }

    fn mark_inaccessible(&self, path: String, err: &std::io::Error) -> FolderNode {
        if err.kind() == ErrorKind::PermissionDenied {
            debug!("Permission denied: {path}");
        } else {
            warn!("Error scanning {path}: {err}");
        }
        self.inaccessible.lock().push(path.clone());
        FolderNode::new_inaccessible(path)
    }
}

/// Attach `child` unless a sibling already has its path.
///
/// Paths are stored as UTF-8, and lossy conversion can map distinct
/// non-UTF-8 names onto one string. Only such names can collide.
fn adopt(parent: &mut FolderNode, child: FolderNode) {
    if child.path.contains(char::REPLACEMENT_CHARACTER)
        && parent.children.iter().any(|sibling| sibling.path == child.path)
    {
        warn!("Skipping {}: name is not valid UTF-8 and collides with a sibling", child.path);
        return;
    }
    parent.push_child(child);
}

/// Run a scan to completion on the calling thread.
///
/// Progress messages go to `progress_tx`. Returns `Ok(None)` if `cancel`
/// was raised, in which case no partial result is kept.
pub fn scan_blocking(
    request: &ScanRequest,
    cancel: &AtomicBool,
    progress_tx: Sender<ScanMessage>,
) -> Result<Option<ScanOutcome>> {
    let start = Instant::now();
    let root = request.root_path.as_path();

    let meta = fs::metadata(root).map_err(|err| SpaceBadgerError::ScanFatal {
        path: root.to_path_buf(),
        details: err.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(SpaceBadgerError::ScanFatal {
            path: root.to_path_buf(),
            details: "Path is not a directory".into(),
        });
    }

    let threads = if request.threads == 0 {
        num_cpus::get()
    } else {
        request.threads
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("spacebadger-scan-{i}"))
        .stack_size(SCAN_THREAD_STACK_SIZE)
        .build()
        .map_err(|err| SpaceBadgerError::ScanFatal {
            path: root.to_path_buf(),
            details: format!("failed to start scan pool: {err}"),
        })?;

    info!(
        "Scanning {} with {threads} threads, {} extra exclude patterns",
        root.display(),
        request.exclude_patterns.len()
    );

    let tracker = ProgressTracker::new(progress_tx);
    let walker = Walker {
        excludes: ExcludeMatcher::new(&request.exclude_patterns),
        tracker: &tracker,
        cancel,
        inaccessible: Mutex::new(Vec::new()),
    };

    let root_node = match pool.install(|| walker.scan_directory(root, 0)) {
        Ok(node) => node,
        Err(WalkError::Cancelled) => return Ok(None),
    };
    // Subtrees skipped after a late cancel would make the tree partial.
    if cancel.load(Ordering::Relaxed) {
        return Ok(None);
    }

    let scan_duration = start.elapsed();
    let total_files = root_node.file_count;
    let total_folders = root_node.folder_count();
    let inaccessible_paths = walker.inaccessible.into_inner();

    info!(
        "Scan complete in {scan_duration:?}: {total_files} files, {total_folders} folders, {} inaccessible",
        inaccessible_paths.len()
    );

    Ok(Some(ScanOutcome {
        root_node,
        scan_duration,
        total_files,
        total_folders,
        inaccessible_paths,
    }))
}

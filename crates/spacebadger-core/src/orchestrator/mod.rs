/// Scan orchestrator: owns the lifecycle of at most one scan at a time.
///
/// `start` supersedes any running scan. Each scan gets a forwarding thread
/// that drains the scanner's channel, turns its messages into
/// [`Notification`]s, and materialises a [`Snapshot`] on completion. After
/// a terminal message (or cancellation) the orchestrator is idle again.
pub mod notification;

pub use notification::{JsonLinesSink, Notification, NotificationSink, PersistingSink};

use crate::error::{Result, SpaceBadgerError};
use crate::model::Snapshot;
use crate::scanner::{self, Canceller, ScanHandle, ScanMessage, ScanOutcome, ScanRequest};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

/// How many inaccessible paths are logged individually per scan.
const MAX_LOGGED_INACCESSIBLE: usize = 10;

struct ActiveScan {
    generation: u64,
    scan_path: String,
    /// Cleared on cancel; the forwarder only notifies while it is `true`.
    live: Arc<Mutex<bool>>,
    canceller: Canceller,
}

pub struct ScanOrchestrator {
    sink: Arc<dyn NotificationSink>,
    active: Arc<Mutex<Option<ActiveScan>>>,
    generation: AtomicU64,
    /// Patterns added to every scan.
    base_excludes: Vec<String>,
    threads: usize,
}

impl ScanOrchestrator {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            active: Arc::new(Mutex::new(None)),
            generation: AtomicU64::new(0),
            base_excludes: Vec::new(),
            threads: 0,
        }
    }

    /// Apply scanner settings from the loaded config.
    #[must_use]
    pub fn with_scanner_config(mut self, config: &crate::config::ScannerConfig) -> Self {
        self.base_excludes = config.exclude_patterns.clone();
        self.threads = config.threads;
        self
    }

    /// Start scanning `path`, cancelling any scan already running.
    pub fn start(&self, path: impl Into<PathBuf>, exclude_patterns: &[String]) -> Result<()> {
        let path = path.into();
        if self.is_scanning() {
            info!("Cancelling previous scan");
            self.cancel();
        }

        let scan_path = path.to_string_lossy().into_owned();
        let request = ScanRequest::new(path)
            .with_excludes(self.base_excludes.iter().cloned())
            .with_excludes(exclude_patterns.iter().cloned())
            .with_threads(self.threads);

        let handle = scanner::start_scan(request)?;
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let live = Arc::new(Mutex::new(true));
        let canceller = handle.canceller();

        *self.active.lock() = Some(ActiveScan {
            generation,
            scan_path: scan_path.clone(),
            live: live.clone(),
            canceller: canceller.clone(),
        });

        let forwarder = Forwarder {
            generation,
            scan_path: scan_path.clone(),
            live,
            sink: self.sink.clone(),
            active: self.active.clone(),
        };
        let spawned = thread::Builder::new()
            .name("spacebadger-forwarder".into())
            .spawn(move || forwarder.run(handle));

        if let Err(err) = spawned {
            canceller.cancel();
            *self.active.lock() = None;
            return Err(SpaceBadgerError::ScanFatal {
                path: scan_path.into(),
                details: format!("failed to spawn forwarder thread: {err}"),
            });
        }
        info!("Started scan of {scan_path}");
        Ok(())
    }

    /// Cancel the running scan. Nothing further is notified for it.
    pub fn cancel(&self) {
        let Some(scan) = self.active.lock().take() else {
            info!("No active scan to cancel");
            return;
        };
        // Waits for an in-flight notification to finish.
        *scan.live.lock() = false;
        scan.canceller.cancel();
        info!("Cancelled scan of {}", scan.scan_path);
    }

    pub fn is_scanning(&self) -> bool {
        self.active.lock().is_some()
    }

    pub fn current_scan_path(&self) -> Option<String> {
        self.active.lock().as_ref().map(|s| s.scan_path.clone())
    }
}

impl Drop for ScanOrchestrator {
    fn drop(&mut self) {
        if self.is_scanning() {
            self.cancel();
        }
    }
}

/// Per-scan forwarding loop; runs on its own thread.
struct Forwarder {
    generation: u64,
    scan_path: String,
    live: Arc<Mutex<bool>>,
    sink: Arc<dyn NotificationSink>,
    active: Arc<Mutex<Option<ActiveScan>>>,
}

impl Forwarder {
    fn run(self, mut handle: ScanHandle) {
        while let Ok(message) = handle.progress_rx.recv() {
            let notification = match message {
                ScanMessage::Progress(progress) => {
                    if self.forward(Notification::Progress(progress)) {
                        continue;
                    }
                    break;
                }
                ScanMessage::Complete(outcome) => self.complete(*outcome),
                ScanMessage::Error { error, path } => {
                    error!("Scan error: {error}");
                    Notification::Error { error, path }
                }
            };
            self.finish(notification);
            handle.join();
            return;
        }

        // Keep draining so a cancelled scanner never blocks on a full channel.
        while handle.progress_rx.recv().is_ok() {}
        let clean_exit = handle.join();

        let message = if clean_exit {
            "Scanner exited without producing a result"
        } else {
            "Scanner thread panicked"
        };
        // Silent if this scan was cancelled.
        if self.finish(Notification::Error {
            error: message.to_string(),
            path: Some(self.scan_path.clone()),
        }) {
            error!("{message} ({})", self.scan_path);
        }
    }

    /// Deliver the terminal notification. Returns whether it was sent.
    fn finish(&self, notification: Notification) -> bool {
        // `prepare` may block on locks held by a cancelling caller, so it
        // runs without the gate.
        let live = *self.live.lock();
        let notification = if live {
            self.sink.prepare(notification)
        } else {
            notification
        };
        // Idle before the terminal message goes out, so a receiver can
        // start the next scan straight away.
        self.release();
        self.forward(notification)
    }

    /// Reset orchestrator state, unless a newer scan already replaced this one.
    fn release(&self) {
        let mut active = self.active.lock();
        if active.as_ref().map(|a| a.generation) == Some(self.generation) {
            *active = None;
        }
    }

    /// Notify unless the scan was cancelled. Returns whether it was sent.
    fn forward(&self, notification: Notification) -> bool {
        let live = self.live.lock();
        if !*live {
            return false;
        }
        self.sink.notify(notification);
        true
    }

    fn complete(&self, outcome: ScanOutcome) -> Notification {
        info!(
            "Scan completed: {} files, {} folders in {:?}",
            outcome.total_files, outcome.total_folders, outcome.scan_duration
        );
        log_inaccessible(&outcome.inaccessible_paths);

        let snapshot = Snapshot::from_scan(
            self.scan_path.clone(),
            outcome.root_node,
            outcome.total_files,
            outcome.total_folders,
            outcome.scan_duration,
        );
        Notification::Complete { snapshot }
    }
}

fn log_inaccessible(paths: &[String]) {
    if paths.is_empty() {
        return;
    }
    warn!("{} inaccessible paths:", paths.len());
    for path in paths.iter().take(MAX_LOGGED_INACCESSIBLE) {
        warn!("  - {path}");
    }
    if paths.len() > MAX_LOGGED_INACCESSIBLE {
        warn!("  ... and {} more", paths.len() - MAX_LOGGED_INACCESSIBLE);
    }
}

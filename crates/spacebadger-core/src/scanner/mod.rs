/// Scanner module: runs one directory walk on a background thread.
///
/// The walk itself lives in [`walker`]; this module owns the execution
/// context: a named scan thread, the ordered message channel back to the
/// caller, and the cancel flag. Cancelling raises the flag, which every scan
/// task checks before touching the filesystem, so the walk unwinds without
/// producing a result or a terminal message.
pub mod exclude;
pub mod progress;
pub mod telemetry;
pub mod walker;

pub use exclude::{ExcludeMatcher, DEFAULT_EXCLUDE_PATTERNS};
pub use progress::{ScanMessage, ScanOutcome, ScanProgress};
pub use walker::{scan_blocking, ScanRequest};

use crate::error::{Result, SpaceBadgerError};
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info};

/// Maximum number of messages that may queue up in the channel.
///
/// Progress is already throttled, so this only matters if the consumer
/// stalls; the scan then blocks briefly instead of growing the heap.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 4_096;

/// Cloneable cancel switch for one scan.
#[derive(Debug, Clone)]
pub struct Canceller(Arc<AtomicBool>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Handle to a running scan.
pub struct ScanHandle {
    /// Zero or more progress messages, then one terminal message.
    pub progress_rx: Receiver<ScanMessage>,
    cancel_flag: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ScanHandle {
    /// Request the scan to stop. Nothing further will be produced.
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }

    /// A switch that cancels this scan from another thread.
    pub fn canceller(&self) -> Canceller {
        Canceller(self.cancel_flag.clone())
    }

    /// Wait for the scan thread to exit.
    ///
    /// Returns `false` if the thread panicked.
    pub fn join(&mut self) -> bool {
        match self.thread.take() {
            Some(handle) => handle.join().is_ok(),
            None => true,
        }
    }
}

/// Start a scan on a background thread.
pub fn start_scan(request: ScanRequest) -> Result<ScanHandle> {
    let (tx, progress_rx) = crossbeam_channel::bounded::<ScanMessage>(PROGRESS_CHANNEL_CAPACITY);
    let cancel_flag = Arc::new(AtomicBool::new(false));
    let cancel_clone = cancel_flag.clone();
    let root_display = request.root_path.to_string_lossy().into_owned();

    let thread = thread::Builder::new()
        .name("spacebadger-scanner".into())
        .spawn(move || {
            info!("Starting scan of {}", request.root_path.display());

            let terminal = match scan_blocking(&request, &cancel_clone, tx.clone()) {
                Ok(Some(outcome)) => ScanMessage::Complete(Box::new(outcome)),
                Ok(None) => {
                    info!("Scan of {} cancelled", request.root_path.display());
                    return;
                }
                Err(err) => {
                    error!("Scan failed: {err}");
                    let (error, path) = match err {
                        SpaceBadgerError::ScanFatal { path, details } => {
                            (details, path.to_string_lossy().into_owned())
                        }
                        other => (other.to_string(), request.root_path.to_string_lossy().into_owned()),
                    };
                    ScanMessage::Error {
                        error,
                        path: Some(path),
                    }
                }
            };
            let _ = tx.send(terminal);
        })
        .map_err(|err| SpaceBadgerError::ScanFatal {
            path: root_display.into(),
            details: format!("failed to spawn scanner thread: {err}"),
        })?;

    Ok(ScanHandle {
        progress_rx,
        cancel_flag,
        thread: Some(thread),
    })
}

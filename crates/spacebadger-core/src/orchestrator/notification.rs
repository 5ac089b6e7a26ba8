/// The outward notification contract of a scan and the sinks that carry it.
///
/// Per scan: zero or more `Progress`, then exactly one `Complete` or
/// `Error`, or nothing at all if the scan was cancelled.
use crate::model::Snapshot;
use crate::scanner::ScanProgress;
use crate::store::SharedStore;
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Notification {
    Progress(ScanProgress),
    Complete {
        snapshot: Snapshot,
    },
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
}

impl Notification {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Notification::Progress(_))
    }
}

/// Receives notifications from the orchestrator's forwarding thread.
///
/// `notify` runs while the orchestrator's cancel gate is held, so `cancel`
/// waits for it. It must not call back into the orchestrator or take locks
/// a cancelling caller may hold. Work of that kind goes in `prepare`, which
/// runs first, outside the gate, on terminal notifications only.
pub trait NotificationSink: Send + Sync {
    fn prepare(&self, notification: Notification) -> Notification {
        notification
    }

    fn notify(&self, notification: Notification);
}

/// Hand notifications to another thread.
impl NotificationSink for Sender<Notification> {
    fn notify(&self, notification: Notification) {
        if self.send(notification).is_err() {
            warn!("Notification receiver dropped");
        }
    }
}

/// Write each notification as one JSON line.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> NotificationSink for JsonLinesSink<W> {
    fn notify(&self, notification: Notification) {
        let line = match serde_json::to_string(&notification) {
            Ok(line) => line,
            Err(err) => {
                error!("Failed to serialise notification: {err}");
                return;
            }
        };
        let mut out = self.out.lock();
        if let Err(err) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!("Failed to write notification: {err}");
        }
    }
}

/// Saves every completed snapshot before passing the completion on.
///
/// A failed save turns the completion into an error notification, so the
/// caller never sees a snapshot that was not persisted. The save happens
/// in `prepare`, so a caller holding the store lock can still cancel.
pub struct PersistingSink<S: NotificationSink> {
    store: SharedStore,
    inner: S,
}

impl<S: NotificationSink> PersistingSink<S> {
    pub fn new(store: SharedStore, inner: S) -> Self {
        Self { store, inner }
    }
}

impl<S: NotificationSink> NotificationSink for PersistingSink<S> {
    fn prepare(&self, notification: Notification) -> Notification {
        let Notification::Complete { snapshot } = notification else {
            return self.inner.prepare(notification);
        };

        let saved = self.store.lock().save(&snapshot);
        let notification = match saved {
            Ok(()) => {
                info!("Snapshot {} saved", snapshot.id());
                Notification::Complete { snapshot }
            }
            Err(err) => {
                error!("Failed to save snapshot {}: {err}", snapshot.id());
                Notification::Error {
                    error: format!("failed to save snapshot: {err}"),
                    path: Some(snapshot.metadata.scan_path.clone()),
                }
            }
        };
        self.inner.prepare(notification)
    }

    fn notify(&self, notification: Notification) {
        self.inner.notify(notification);
    }
}

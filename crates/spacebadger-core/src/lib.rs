/// SpaceBadger Core: scanning, snapshot storage and comparison.
///
/// This crate contains all business logic with no frontend dependencies.
/// The `spacebadger` binary is one consumer; anything that can implement a
/// [`orchestrator::NotificationSink`] can drive a scan.
///
/// # Modules
///
/// - [`scanner`]: Concurrent, cancellable directory walk with progress.
/// - [`orchestrator`]: One-scan-at-a-time lifecycle and notifications.
/// - [`model`]: Folder tree, snapshots and the flat row form.
/// - [`store`]: SQLite persistence of snapshots and settings.
/// - [`analysis`]: Snapshot comparison and trend extraction.
/// - [`config`]: TOML configuration with environment overrides.
pub mod analysis;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod scanner;
pub mod store;

pub use error::{Result, SpaceBadgerError};

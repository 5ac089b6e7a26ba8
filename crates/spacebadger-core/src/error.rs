/// Error types shared by every SpaceBadger subsystem.
///
/// Per-node I/O failures during a scan never surface here; they are
/// recorded on the tree and logged. These variants cover the failures that
/// abort a whole request.
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Shared `Result` alias for the core crate.
pub type Result<T> = std::result::Result<T, SpaceBadgerError>;

/// Which side of a comparison a missing snapshot was requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::A => f.write_str("A"),
            Side::B => f.write_str("B"),
        }
    }
}

/// Top-level error type for the core crate.
#[derive(Debug, Error)]
pub enum SpaceBadgerError {
    #[error("IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("storage failure in {context}: {source}")]
    Sql {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Snapshot {side} not found: {id}")]
    NotFound { side: Side, id: String },

    #[error("invalid input: {details}")]
    InvalidInput { details: String },

    #[error("cannot scan {path}: {details}")]
    ScanFatal { path: PathBuf, details: String },

    #[error("invalid configuration: {details}")]
    Config { details: String },

    #[error("serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },
}

impl SpaceBadgerError {
    /// Convenience constructor for IO errors with a known path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Wrap a rusqlite error with the operation that produced it.
    pub fn sql(context: &'static str) -> impl FnOnce(rusqlite::Error) -> Self {
        move |source| Self::Sql { context, source }
    }

    /// `true` for the typed "snapshot does not exist" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<rusqlite::Error> for SpaceBadgerError {
    fn from(source: rusqlite::Error) -> Self {
        Self::Sql {
            context: "rusqlite",
            source,
        }
    }
}

impl From<toml::de::Error> for SpaceBadgerError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config {
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for SpaceBadgerError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<csv::Error> for SpaceBadgerError {
    fn from(value: csv::Error) -> Self {
        Self::Serialization {
            context: "csv",
            details: value.to_string(),
        }
    }
}

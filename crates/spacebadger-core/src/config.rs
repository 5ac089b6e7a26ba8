/// Configuration: optional TOML file, environment overrides, defaults.
use crate::error::{Result, SpaceBadgerError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "SPACEBADGER_CONFIG";
/// Environment override for [`Config::database_path`].
pub const DB_ENV: &str = "SPACEBADGER_DB";
/// Environment override for [`ScannerConfig::threads`].
pub const THREADS_ENV: &str = "SPACEBADGER_THREADS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// SQLite database holding snapshots and settings.
    pub database_path: PathBuf,
    pub scanner: ScannerConfig,
    pub list: ListConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ScannerConfig {
    /// Patterns excluded from every scan on top of the built-in defaults.
    pub exclude_patterns: Vec<String>,
    /// Worker threads for the scan pool; 0 means one per CPU.
    pub threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ListConfig {
    pub page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            scanner: ScannerConfig::default(),
            list: ListConfig::default(),
        }
    }
}

impl Default for ListConfig {
    fn default() -> Self {
        Self { page_size: 50 }
    }
}

impl ScannerConfig {
    /// Effective pool size.
    pub fn thread_count(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }
}

impl Config {
    /// Load from `path`, else from `$SPACEBADGER_CONFIG`, else defaults.
    ///
    /// A missing file is only an error when a path was given explicitly.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut cfg = match explicit {
            Some(path) => {
                let raw = fs::read_to_string(&path).map_err(|e| SpaceBadgerError::io(&path, e))?;
                toml::from_str(&raw)?
            }
            None => Self::default(),
        };

        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a config from TOML text without touching the environment.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(db) = env::var_os(DB_ENV) {
            self.database_path = PathBuf::from(db);
        }
        if let Ok(raw) = env::var(THREADS_ENV) {
            self.scanner.threads = raw.trim().parse().map_err(|_| SpaceBadgerError::Config {
                details: format!("{THREADS_ENV} must be a non-negative integer, got {raw:?}"),
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(SpaceBadgerError::Config {
                details: "database_path must not be empty".into(),
            });
        }
        if self.list.page_size == 0 {
            return Err(SpaceBadgerError::Config {
                details: "list.page_size must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// `$XDG_DATA_HOME/spacebadger/spacebadger.db`, falling back to
/// `~/.local/share` and finally the working directory.
fn default_database_path() -> PathBuf {
    let base = env::var_os("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join("spacebadger").join("spacebadger.db")
}

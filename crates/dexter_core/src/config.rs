//! Store configuration.
//!
//! # Responsibility
//! - Resolve the database location from `DB_PATH` or the application root.
//! - Carry connection tuning (open retries, busy timeout, journal/sync mode).
//!
//! # Invariants
//! - Defaults match production: WAL journal, NORMAL sync, 30s busy timeout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the store location.
pub const DB_PATH_ENV: &str = "DB_PATH";
/// Store file name used under the application root.
pub const DEFAULT_DB_FILE_NAME: &str = "dexter.db";

const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// SQLite journal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Readers never block the single writer.
    #[default]
    Wal,
    /// Rollback journal; only used for stores that cannot hold a WAL file.
    Delete,
}

impl JournalMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// SQLite `synchronous` durability level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// fsync at checkpoints only; safe under WAL.
    #[default]
    Normal,
    /// fsync on every commit.
    Full,
}

impl SyncMode {
    pub fn pragma_value(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Full => "full",
        }
    }
}

/// Connection settings for one store file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Extra open attempts after the first failure.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// How long a writer waits on a held lock before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub journal_mode: JournalMode,
    #[serde(default)]
    pub sync_mode: SyncMode,
}

impl StoreConfig {
    /// Builds a config with production defaults for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            retry_count: DEFAULT_RETRY_COUNT,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
        }
    }

    /// Resolves the store path from `DB_PATH`, else `<app_root>/dexter.db`.
    pub fn from_env(app_root: impl AsRef<Path>) -> Self {
        let path = std::env::var_os(DB_PATH_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| app_root.as_ref().join(DEFAULT_DB_FILE_NAME));
        Self::new(path)
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_retry_count() -> u32 {
    DEFAULT_RETRY_COUNT
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

//! Runtime configuration
//!
//! Defaults are usable as-is. `from_env` overrides them from `WORLDLOG_*`
//! variables, `from_file` from a JSON document with the same field names.

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Top-level configuration for the audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Directory holding the database file
    pub data_dir: PathBuf,
    /// Database file name inside `data_dir`
    pub database_file: String,
    /// Default retention used by `purge` when none is given
    pub retention_days: u32,
    pub recorder: RecorderConfig,
    pub engine: EngineConfig,
    /// Rows fetched per cursor page
    pub page_size: usize,
    /// Cap on lookup results
    pub lookup_limit: usize,
    /// Minimum spacing between periodic inventory snapshots per actor
    pub snapshot_interval_ms: i64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_file: "worldlog.db".to_string(),
            retention_days: 30,
            recorder: RecorderConfig::default(),
            engine: EngineConfig::default(),
            page_size: 1000,
            lookup_limit: 256,
            snapshot_interval_ms: 10 * 60 * 1000,
        }
    }
}

/// Settings for the background persistence worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Bound on queued, not yet persisted records
    pub queue_capacity: usize,
    /// Records written per transaction before a forced flush
    pub max_batch_size: usize,
    /// Flush interval for partially filled batches
    pub flush_interval_ms: u64,
    /// Write attempts after the first failure before a batch is dropped
    pub max_retries: u32,
    /// Initial retry delay, doubled per attempt
    pub retry_backoff_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 65_536,
            max_batch_size: 500,
            flush_interval_ms: 50,
            max_retries: 5,
            retry_backoff_ms: 100,
        }
    }
}

impl RecorderConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(16)).unwrap_or(u64::MAX);
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(factor))
    }
}

/// Settings for rollback/restore jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Writes issued per `apply_batch` call (one host tick)
    pub apply_batch_size: usize,
    /// Individual error messages kept in a result summary
    pub max_reported_errors: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            apply_batch_size: 500,
            max_reported_errors: 20,
        }
    }
}

impl AuditConfig {
    /// Config rooted at a custom data directory
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Full path of the database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    /// Load from a JSON file; missing fields fall back to defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Defaults overridden by any `WORLDLOG_*` variables that are set
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = env::var("WORLDLOG_DATA_DIR") {
            let path = PathBuf::from(dir);
            config.data_dir = if path.is_absolute() {
                path
            } else {
                env::current_dir()
                    .unwrap_or_else(|_| PathBuf::from("."))
                    .join(path)
            };
        }
        if let Ok(file) = env::var("WORLDLOG_DATABASE_FILE") {
            config.database_file = file;
        }

        override_from_env("WORLDLOG_RETENTION_DAYS", &mut config.retention_days);
        override_from_env("WORLDLOG_PAGE_SIZE", &mut config.page_size);
        override_from_env("WORLDLOG_LOOKUP_LIMIT", &mut config.lookup_limit);
        override_from_env("WORLDLOG_SNAPSHOT_INTERVAL_MS", &mut config.snapshot_interval_ms);
        override_from_env("WORLDLOG_QUEUE_CAPACITY", &mut config.recorder.queue_capacity);
        override_from_env("WORLDLOG_BATCH_SIZE", &mut config.recorder.max_batch_size);
        override_from_env("WORLDLOG_FLUSH_INTERVAL_MS", &mut config.recorder.flush_interval_ms);
        override_from_env("WORLDLOG_MAX_RETRIES", &mut config.recorder.max_retries);
        override_from_env("WORLDLOG_RETRY_BACKOFF_MS", &mut config.recorder.retry_backoff_ms);
        override_from_env("WORLDLOG_APPLY_BATCH_SIZE", &mut config.engine.apply_batch_size);

        config
    }
}

fn override_from_env<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = env::var(key) {
        match raw.trim().parse::<T>() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparseable config value"),
        }
    }
}

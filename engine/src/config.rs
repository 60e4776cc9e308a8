//! Replica configuration.

use crate::coerce::DateSystem;
use crate::{Error, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default deadline for one remote batch commit.
pub const DEFAULT_COMMIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of rows shown in an import preview.
pub const DEFAULT_PREVIEW_ROWS: usize = 20;

/// Configuration for a [`Replica`](crate::Replica).
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaConfig {
    /// Path of the local SQLite database
    pub database_path: PathBuf,
    /// Base URL of the remote store; `None` disables syncing
    pub remote_url: Option<String>,
    /// Deadline for a single remote commit
    pub commit_timeout: Duration,
    /// Whether every local write triggers a background sync
    pub sync_on_write: bool,
    /// Epoch convention for spreadsheet date serials
    pub date_system: DateSystem,
    /// Rows shown by an import preview
    pub preview_rows: usize,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("fieldsync.db"),
            remote_url: None,
            commit_timeout: DEFAULT_COMMIT_TIMEOUT,
            sync_on_write: true,
            date_system: DateSystem::default(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

impl ReplicaConfig {
    /// Load configuration from `FIELDSYNC_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but malformed ones are errors.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = env::var("FIELDSYNC_DATABASE") {
            config.database_path = PathBuf::from(path);
        }

        config.remote_url = env::var("FIELDSYNC_REMOTE_URL")
            .ok()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());

        if let Ok(secs) = env::var("FIELDSYNC_COMMIT_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .map_err(|_| Error::Config(format!("invalid commit timeout: {secs}")))?;
            config.commit_timeout = Duration::from_secs(secs);
        }

        if let Ok(flag) = env::var("FIELDSYNC_SYNC_ON_WRITE") {
            config.sync_on_write = parse_flag(&flag)?;
        }

        if let Ok(system) = env::var("FIELDSYNC_DATE_SYSTEM") {
            config.date_system = system.parse()?;
        }

        if let Ok(rows) = env::var("FIELDSYNC_PREVIEW_ROWS") {
            config.preview_rows = rows
                .parse()
                .map_err(|_| Error::Config(format!("invalid preview rows: {rows}")))?;
        }

        Ok(config)
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn with_remote_url(mut self, url: impl Into<String>) -> Self {
        self.remote_url = Some(url.into());
        self
    }

    pub fn with_commit_timeout(mut self, timeout: Duration) -> Self {
        self.commit_timeout = timeout;
        self
    }

    pub fn with_sync_on_write(mut self, enabled: bool) -> Self {
        self.sync_on_write = enabled;
        self
    }

    pub fn with_date_system(mut self, system: DateSystem) -> Self {
        self.date_system = system;
        self
    }

    pub fn with_preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("invalid flag: {other}"))),
    }
}

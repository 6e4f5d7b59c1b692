//! Connection settings applied when a [`SqliteExecutor`](crate::SqliteExecutor) opens its database.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::error::{SqliteError, SqliteResult};

const MEMORY: &str = ":memory:";

/// Where the database lives and the pragmas set on open.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteConfig {
    /// Database file; `None` opens a private in-memory database.
    pub path: Option<PathBuf>,
    /// `PRAGMA foreign_keys`.
    pub foreign_keys: bool,
    /// How long a statement waits on a locked database.
    #[serde(with = "millis")]
    pub busy_timeout: Duration,
    /// `PRAGMA journal_mode`, file databases only.
    pub journal_mode: JournalMode,
    /// `PRAGMA synchronous`.
    pub synchronous: SynchronousMode,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            foreign_keys: true,
            busy_timeout: Duration::from_secs(5),
            journal_mode: JournalMode::Wal,
            synchronous: SynchronousMode::Normal,
        }
    }
}

/// `PRAGMA journal_mode` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    /// Rollback journal deleted after each transaction.
    Delete,
    /// Write-ahead log.
    #[default]
    Wal,
    /// Rollback journal kept in memory.
    Memory,
}

/// `PRAGMA synchronous` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynchronousMode {
    /// No syncs.
    Off,
    /// Sync at critical moments.
    #[default]
    Normal,
    /// Sync on every commit.
    Full,
}

impl JournalMode {
    fn pragma(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Wal => "WAL",
            Self::Memory => "MEMORY",
        }
    }
}

impl SynchronousMode {
    fn pragma(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::Normal => "NORMAL",
            Self::Full => "FULL",
        }
    }
}

impl FromStr for JournalMode {
    type Err = SqliteError;

    fn from_str(s: &str) -> SqliteResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "delete" => Ok(Self::Delete),
            "wal" => Ok(Self::Wal),
            "memory" => Ok(Self::Memory),
            other => Err(SqliteError::config(format!("unsupported journal_mode '{}'", other))),
        }
    }
}

impl FromStr for SynchronousMode {
    type Err = SqliteError;

    fn from_str(s: &str) -> SqliteResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "normal" => Ok(Self::Normal),
            "full" => Ok(Self::Full),
            other => Err(SqliteError::config(format!("unsupported synchronous '{}'", other))),
        }
    }
}

impl SqliteConfig {
    /// A private in-memory database.
    pub fn memory() -> Self {
        Self::default()
    }

    /// A database file, created when missing.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Parse `sqlite::memory:`, `sqlite://<path>`, `sqlite:<path>` or a bare
    /// path, with options as query pairs:
    /// `sqlite://shop.db?journal_mode=delete&busy_timeout=250`.
    pub fn from_url(url: &str) -> SqliteResult<Self> {
        let (location, options) = url.split_once('?').unwrap_or((url, ""));
        let location = location
            .strip_prefix("sqlite://")
            .or_else(|| location.strip_prefix("sqlite:"))
            .unwrap_or(location);

        let mut config = match location {
            "" => return Err(SqliteError::config(format!("no database path in '{}'", url))),
            MEMORY => Self::memory(),
            path => Self::file(path),
        };
        for pair in options.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| SqliteError::config(format!("option '{}' has no value", pair)))?;
            config.set(key, value)?;
        }
        Ok(config)
    }

    /// Set one option by its URL name.
    pub fn set(&mut self, key: &str, value: &str) -> SqliteResult<()> {
        let invalid = || SqliteError::config(format!("invalid value '{}' for '{}'", value, key));
        match key {
            "foreign_keys" => {
                self.foreign_keys = match value {
                    "true" | "on" | "1" => true,
                    "false" | "off" | "0" => false,
                    _ => return Err(invalid()),
                }
            }
            "busy_timeout" => self.busy_timeout = Duration::from_millis(value.parse().map_err(|_| invalid())?),
            "journal_mode" => self.journal_mode = value.parse()?,
            "synchronous" => self.synchronous = value.parse()?,
            _ => return Err(SqliteError::config(format!("unknown option '{}'", key))),
        }
        Ok(())
    }

    /// Whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.path.is_none()
    }

    /// The path as SQLite names it.
    pub fn path_str(&self) -> std::borrow::Cow<'_, str> {
        match &self.path {
            Some(path) => path.to_string_lossy(),
            None => MEMORY.into(),
        }
    }

    /// Open a connection and apply the pragmas.
    pub fn open(&self) -> SqliteResult<Connection> {
        let conn = match &self.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(|e| SqliteError::connection(format!("cannot open '{}': {}", self.path_str(), e)))?;
        self.apply(&conn)?;
        debug!(path = %self.path_str(), "opened SQLite database");
        Ok(conn)
    }

    /// Apply the pragmas to an open connection.
    ///
    /// In-memory databases keep their own journal mode.
    pub fn apply(&self, conn: &Connection) -> SqliteResult<()> {
        conn.pragma_update(None, "foreign_keys", self.foreign_keys)?;
        if !self.is_memory() {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", self.journal_mode.pragma(), |row| row.get(0))?;
            trace!(journal_mode = %mode, "journal mode set");
        }
        conn.pragma_update(None, "synchronous", self.synchronous.pragma())?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{internal, Result};
use crate::model::MigrationId;

/// Name of the table that holds the migration log
pub const LOG_TABLE_NAME: &str = "dbmigrator_migration";

/// Outcome of the last apply/revert attempt of a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    NotApplied,
    Applied,
    Error,
}

impl LogStatus {
    /// Persisted integer code
    pub fn code(&self) -> i64 {
        match self {
            LogStatus::NotApplied => 0,
            LogStatus::Applied => 1,
            LogStatus::Error => 2,
        }
    }

    /// Parse a persisted integer code
    ///
    /// # Errors
    ///
    /// Returns `Internal` for codes outside 0..=2; such a row can only come
    /// from a foreign writer.
    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            0 => Ok(LogStatus::NotApplied),
            1 => Ok(LogStatus::Applied),
            2 => Ok(LogStatus::Error),
            other => Err(internal(
                "decode_status",
                format!("unknown migration status code {}", other),
            )),
        }
    }

    /// Human-readable label used by status listings
    pub fn label(&self) -> &'static str {
        match self {
            LogStatus::NotApplied => "not applied",
            LogStatus::Applied => "applied",
            LogStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the migration log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: MigrationId,
    pub status: LogStatus,
    /// Name snapshot taken when the row was written
    pub name: String,
    /// Time of the last write to this row
    pub time: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(id: MigrationId, status: LogStatus, name: impl Into<String>) -> Self {
        Self {
            id,
            status,
            name: name.into(),
            time: Utc::now(),
        }
    }
}

/// Restricts log queries by status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFilter {
    pub status: LogStatus,
}

impl LogFilter {
    pub fn status(status: LogStatus) -> Self {
        Self { status }
    }

    pub fn applied() -> Self {
        Self::status(LogStatus::Applied)
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        entry.status == self.status
    }
}

/// The persisted log keyed by migration ID
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSet {
    entries: BTreeMap<MigrationId, LogEntry>,
}

impl LogSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = LogEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| (e.id, e)).collect(),
        }
    }

    pub fn get(&self, id: MigrationId) -> Option<&LogEntry> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: MigrationId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Whether the migration's effective status is `Applied`
    pub fn is_applied(&self, id: MigrationId) -> bool {
        self.get(id)
            .is_some_and(|e| e.status == LogStatus::Applied)
    }

    /// Highest applied ID, or 0 when nothing is applied
    pub fn version(&self) -> MigrationId {
        self.entries
            .values()
            .filter(|e| e.status == LogStatus::Applied)
            .map(|e| e.id)
            .max()
            .unwrap_or(0)
    }

    /// Entries in ascending ID order
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

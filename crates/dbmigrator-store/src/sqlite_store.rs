//! SQLite-backed Log Store
//!
//! Every transaction gets its own connection. The connection stays in
//! autocommit mode until the first write, which issues `BEGIN IMMEDIATE`;
//! this lets a bookkeeping transaction stay open while self-committing
//! actions run on other connections without either blocking the other.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dbmigrator_core::errors::{internal, not_found};
use dbmigrator_core::model::{LogEntry, LogFilter, LogStatus, LOG_TABLE_NAME};
use dbmigrator_core::store::{LogStore, LogTransaction, SqlExecutor};
use rusqlite::{params, Connection, OptionalExtension};

use crate::config::StoreConfig;
use crate::db::{self, ConnectionOptions};
use crate::errors::{persistence_error, statement_error, write_error, Result};

/// Log table DDL; `time` holds Unix milliseconds
const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS dbmigrator_migration (
    id INTEGER PRIMARY KEY,
    status INTEGER NOT NULL DEFAULT 0,
    name VARCHAR(100) NOT NULL,
    time INTEGER NOT NULL DEFAULT (CAST((julianday('now') - 2440587.5) * 86400000 AS INTEGER))
)";

/// Log Store persisted in a SQLite database file
#[derive(Debug, Clone)]
pub struct SqliteLogStore {
    path: PathBuf,
    options: ConnectionOptions,
}

impl SqliteLogStore {
    /// Store backed by the database file at `path`
    ///
    /// Nothing is opened until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_options(path, ConnectionOptions::default())
    }

    pub fn with_options(path: impl Into<PathBuf>, options: ConnectionOptions) -> Self {
        Self {
            path: path.into(),
            options,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::with_options(
            &config.path,
            ConnectionOptions {
                busy_timeout: Duration::from_millis(config.busy_timeout_ms),
                journal_mode: config.journal_mode,
            },
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        db::open(&self.path, &self.options)
    }
}

impl LogStore for SqliteLogStore {
    fn ensure_table_exists(&self) -> Result<()> {
        self.connect()?
            .execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| persistence_error("ensure_table_exists", e))?;
        tracing::debug!(table = LOG_TABLE_NAME, path = %self.path.display(), "log table ready");
        Ok(())
    }

    fn query(&self, offset: usize, limit: usize) -> Result<Vec<LogEntry>> {
        select_page(&self.connect()?, None, offset, limit)
    }

    fn last_matching(&self, filter: Option<LogFilter>) -> Result<LogEntry> {
        select_last(&self.connect()?, filter)
    }

    fn begin_transaction(&self) -> Result<Box<dyn LogTransaction>> {
        Ok(Box::new(SqliteTransaction {
            conn: self.connect()?,
            active: false,
        }))
    }
}

/// One connection plus whether it holds an open write transaction
pub struct SqliteTransaction {
    conn: Connection,
    active: bool,
}

impl SqliteTransaction {
    fn begin(&mut self) -> Result<()> {
        if !self.active {
            self.conn
                .execute_batch("BEGIN IMMEDIATE")
                .map_err(|e| persistence_error("begin_transaction", e))?;
            self.active = true;
        }
        Ok(())
    }

    fn finish(&mut self, statement: &str, op: &str) -> Result<()> {
        if self.active {
            self.active = false;
            self.conn
                .execute_batch(statement)
                .map_err(|e| persistence_error(op, e))?;
        }
        Ok(())
    }
}

impl SqlExecutor for SqliteTransaction {
    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        self.begin()?;
        self.conn
            .execute_batch(sql)
            .map_err(|e| statement_error("execute_batch", e))
    }
}

impl LogTransaction for SqliteTransaction {
    fn executor(&mut self) -> &mut dyn SqlExecutor {
        self
    }

    fn query(
        &mut self,
        filter: Option<LogFilter>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        select_page(&self.conn, filter, offset, limit)
    }

    fn last_matching(&mut self, filter: Option<LogFilter>) -> Result<LogEntry> {
        select_last(&self.conn, filter)
    }

    fn batch_insert(&mut self, entries: &[LogEntry]) -> Result<Vec<LogEntry>> {
        self.begin()?;
        let now = Utc::now();
        let mut stmt = self
            .conn
            .prepare_cached(
                "INSERT INTO dbmigrator_migration (id, status, name, time)
                 VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(|e| persistence_error("batch_insert", e))?;

        let mut written = Vec::with_capacity(entries.len());
        for entry in entries {
            stmt.execute(params![
                entry.id,
                entry.status.code(),
                entry.name,
                now.timestamp_millis()
            ])
            .map_err(|e| write_error("batch_insert", entry.id, e))?;
            written.push(LogEntry {
                time: now,
                ..entry.clone()
            });
        }
        Ok(written)
    }

    fn batch_update(&mut self, entries: &[LogEntry]) -> Result<Vec<LogEntry>> {
        self.begin()?;
        let now = Utc::now();
        let mut stmt = self
            .conn
            .prepare_cached(
                "UPDATE dbmigrator_migration SET status = ?2, name = ?3, time = ?4 WHERE id = ?1",
            )
            .map_err(|e| persistence_error("batch_update", e))?;

        let mut written = Vec::with_capacity(entries.len());
        for entry in entries {
            let changed = stmt
                .execute(params![
                    entry.id,
                    entry.status.code(),
                    entry.name,
                    now.timestamp_millis()
                ])
                .map_err(|e| write_error("batch_update", entry.id, e))?;
            if changed == 0 {
                return Err(not_found("batch_update", "log row does not exist")
                    .with_migration_id(entry.id));
            }
            written.push(LogEntry {
                time: now,
                ..entry.clone()
            });
        }
        Ok(written)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finish("COMMIT", "commit")
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK", "rollback")
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if let Err(err) = self.finish("ROLLBACK", "rollback") {
            tracing::warn!(error = %err, "rollback of abandoned transaction failed");
        }
    }
}

type RawRow = (i64, i64, String, i64);

fn decode(raw: RawRow) -> Result<LogEntry> {
    let (id, status, name, millis) = raw;
    let id = u32::try_from(id)
        .map_err(|_| internal("decode_row", format!("migration id {} out of range", id)))?;
    let time = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| internal("decode_row", format!("invalid timestamp {}", millis)))?;
    Ok(LogEntry {
        id,
        status: LogStatus::from_code(status)?,
        name,
        time,
    })
}

fn status_param(filter: Option<LogFilter>) -> Option<i64> {
    filter.map(|f| f.status.code())
}

fn select_page(
    conn: &Connection,
    filter: Option<LogFilter>,
    offset: usize,
    limit: usize,
) -> Result<Vec<LogEntry>> {
    // SQLite treats a negative LIMIT as unbounded
    let limit = if limit == 0 {
        -1
    } else {
        i64::try_from(limit).unwrap_or(i64::MAX)
    };
    let offset = i64::try_from(offset).unwrap_or(i64::MAX);

    let mut stmt = conn
        .prepare_cached(
            "SELECT id, status, name, time FROM dbmigrator_migration
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY id ASC LIMIT ?2 OFFSET ?3",
        )
        .map_err(|e| persistence_error("query", e))?;
    let raw: Vec<RawRow> = stmt
        .query_map(params![status_param(filter), limit, offset], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })
        .map_err(|e| persistence_error("query", e))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| persistence_error("query", e))?;

    if raw.is_empty() {
        return Err(not_found("query", "no migration log rows"));
    }
    raw.into_iter().map(decode).collect()
}

fn select_last(conn: &Connection, filter: Option<LogFilter>) -> Result<LogEntry> {
    let raw: Option<RawRow> = conn
        .query_row(
            "SELECT id, status, name, time FROM dbmigrator_migration
             WHERE (?1 IS NULL OR status = ?1)
             ORDER BY id DESC LIMIT 1",
            params![status_param(filter)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()
        .map_err(|e| persistence_error("last_matching", e))?;

    match raw {
        Some(raw) => decode(raw),
        None => Err(not_found("last_matching", "no matching migration log row")),
    }
}

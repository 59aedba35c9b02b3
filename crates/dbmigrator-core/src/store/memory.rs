//! In-memory Log Store
//!
//! Keeps log rows in a `BTreeMap` and records executed SQL in a journal
//! instead of running it. Transactions stage their work and apply it on
//! commit, so atomicity can be asserted without a database. Failure
//! injection hooks let tests drive the error paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::errors::{internal, not_found, ErrorKind, MigrateError, Result};
use crate::model::{LogEntry, LogFilter, MigrationId};
use crate::store::{LogStore, LogTransaction, SqlExecutor};

#[derive(Debug, Default)]
struct MemoryState {
    table_exists: bool,
    rows: BTreeMap<MigrationId, LogEntry>,
    journal: Vec<String>,
    failing_sql: HashSet<String>,
    fail_log_writes: bool,
    calls: usize,
}

/// Shared handle to an in-memory log; clones see the same state
#[derive(Debug, Clone, Default)]
pub struct InMemoryLogStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with pre-existing log rows
    pub fn with_entries(entries: impl IntoIterator<Item = LogEntry>) -> Self {
        let store = Self::new();
        if let Ok(mut state) = store.state.lock() {
            state.table_exists = true;
            state.rows = entries.into_iter().map(|e| (e.id, e)).collect();
        }
        store
    }

    /// Make every execution of exactly `sql` fail
    pub fn fail_on_sql(self, sql: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failing_sql.insert(sql.into());
        }
        self
    }

    /// Make `batch_insert` and `batch_update` fail
    pub fn fail_log_writes(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_log_writes = fail;
        }
    }

    /// Committed SQL statements, in execution order
    pub fn applied_statements(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.journal.clone())
            .unwrap_or_default()
    }

    /// Committed log rows in ascending ID order
    pub fn rows(&self) -> Vec<LogEntry> {
        self.state
            .lock()
            .map(|s| s.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of store entry points invoked so far
    pub fn storage_calls(&self) -> usize {
        self.state.lock().map(|s| s.calls).unwrap_or_default()
    }

    pub fn table_exists(&self) -> bool {
        self.state.lock().map(|s| s.table_exists).unwrap_or(false)
    }

    fn lock(&self, op: &str) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| internal(op, "in-memory store lock poisoned"))?;
        state.calls += 1;
        Ok(state)
    }
}

fn page(
    rows: impl Iterator<Item = LogEntry>,
    filter: Option<LogFilter>,
    offset: usize,
    limit: usize,
) -> Result<Vec<LogEntry>> {
    let matching = rows.filter(|e| filter.map_or(true, |f| f.matches(e)));
    let limit = if limit == 0 { usize::MAX } else { limit };
    let out: Vec<LogEntry> = matching.skip(offset).take(limit).collect();
    if out.is_empty() {
        return Err(not_found("query", "no migration log rows"));
    }
    Ok(out)
}

fn last(
    rows: impl DoubleEndedIterator<Item = LogEntry>,
    filter: Option<LogFilter>,
) -> Result<LogEntry> {
    rows.rev()
        .find(|e| filter.map_or(true, |f| f.matches(e)))
        .ok_or_else(|| not_found("last_matching", "no matching migration log row"))
}

impl LogStore for InMemoryLogStore {
    fn ensure_table_exists(&self) -> Result<()> {
        self.lock("ensure_table_exists")?.table_exists = true;
        Ok(())
    }

    fn query(&self, offset: usize, limit: usize) -> Result<Vec<LogEntry>> {
        let state = self.lock("query")?;
        page(state.rows.values().cloned(), None, offset, limit)
    }

    fn last_matching(&self, filter: Option<LogFilter>) -> Result<LogEntry> {
        let state = self.lock("last_matching")?;
        last(state.rows.values().cloned(), filter)
    }

    fn begin_transaction(&self) -> Result<Box<dyn LogTransaction>> {
        drop(self.lock("begin_transaction")?);
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            statements: Vec::new(),
            writes: BTreeMap::new(),
        }))
    }
}

/// Staged work of one in-memory transaction
struct MemoryTransaction {
    store: InMemoryLogStore,
    statements: Vec<String>,
    writes: BTreeMap<MigrationId, LogEntry>,
}

impl MemoryTransaction {
    /// Committed rows overlaid with this transaction's writes
    fn visible_rows(&self) -> Result<BTreeMap<MigrationId, LogEntry>> {
        let state = self.store.lock("read")?;
        let mut rows = state.rows.clone();
        rows.extend(self.writes.iter().map(|(id, e)| (*id, e.clone())));
        Ok(rows)
    }

    fn check_writable(&self, op: &str) -> Result<()> {
        let state = self.store.lock(op)?;
        if state.fail_log_writes {
            return Err(internal(op, "injected log write failure"));
        }
        Ok(())
    }
}

impl SqlExecutor for MemoryTransaction {
    fn execute_batch(&mut self, sql: &str) -> Result<()> {
        let failing = self.store.lock("execute_batch")?.failing_sql.contains(sql);
        if failing {
            return Err(MigrateError::new(ErrorKind::UserSqlError)
                .with_op("execute_batch")
                .with_message(format!("statement rejected: {}", sql)));
        }
        self.statements.push(sql.to_string());
        Ok(())
    }
}

impl LogTransaction for MemoryTransaction {
    fn executor(&mut self) -> &mut dyn SqlExecutor {
        self
    }

    fn query(
        &mut self,
        filter: Option<LogFilter>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        page(self.visible_rows()?.into_values(), filter, offset, limit)
    }

    fn last_matching(&mut self, filter: Option<LogFilter>) -> Result<LogEntry> {
        last(self.visible_rows()?.into_values(), filter)
    }

    fn batch_insert(&mut self, entries: &[LogEntry]) -> Result<Vec<LogEntry>> {
        self.check_writable("batch_insert")?;
        let existing = self.visible_rows()?;
        let mut seen = HashSet::new();
        for entry in entries {
            if existing.contains_key(&entry.id) || !seen.insert(entry.id) {
                return Err(MigrateError::new(ErrorKind::Duplicate)
                    .with_op("batch_insert")
                    .with_migration_id(entry.id)
                    .with_message("log row already exists"));
            }
        }

        let now = Utc::now();
        let written: Vec<LogEntry> = entries
            .iter()
            .map(|e| LogEntry { time: now, ..e.clone() })
            .collect();
        self.writes
            .extend(written.iter().map(|e| (e.id, e.clone())));
        Ok(written)
    }

    fn batch_update(&mut self, entries: &[LogEntry]) -> Result<Vec<LogEntry>> {
        self.check_writable("batch_update")?;
        let existing = self.visible_rows()?;
        if let Some(missing) = entries.iter().find(|e| !existing.contains_key(&e.id)) {
            return Err(not_found("batch_update", "log row does not exist")
                .with_migration_id(missing.id));
        }

        let now = Utc::now();
        let written: Vec<LogEntry> = entries
            .iter()
            .map(|e| LogEntry { time: now, ..e.clone() })
            .collect();
        self.writes
            .extend(written.iter().map(|e| (e.id, e.clone())));
        Ok(written)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        let mut state = self.store.lock("commit")?;
        state.journal.append(&mut self.statements);
        let writes = std::mem::take(&mut self.writes);
        state.rows.extend(writes);
        Ok(())
    }

    // Staged work is simply dropped.
    fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LogStatus;

    fn entry(id: MigrationId, status: LogStatus) -> LogEntry {
        LogEntry::new(id, status, format!("m{}", id))
    }

    #[test]
    fn test_query_pages_in_id_order() {
        let store = InMemoryLogStore::with_entries([
            entry(3, LogStatus::Applied),
            entry(1, LogStatus::Applied),
            entry(2, LogStatus::Error),
        ]);

        let ids: Vec<_> = store.query(0, 0).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let ids: Vec<_> = store.query(1, 1).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2]);

        assert_eq!(store.query(3, 0).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_last_matching_filters_by_status() {
        let store = InMemoryLogStore::with_entries([
            entry(1, LogStatus::Applied),
            entry(2, LogStatus::Applied),
            entry(3, LogStatus::Error),
        ]);

        assert_eq!(store.last_matching(Some(LogFilter::applied())).unwrap().id, 2);
        assert_eq!(store.last_matching(None).unwrap().id, 3);
        assert_eq!(
            InMemoryLogStore::new()
                .last_matching(None)
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_transaction_sees_own_writes() {
        let store = InMemoryLogStore::new();
        let mut tx = store.begin_transaction().unwrap();
        tx.batch_insert(&[entry(1, LogStatus::Applied)]).unwrap();

        assert_eq!(tx.query(None, 0, 0).unwrap().len(), 1);
        assert!(store.rows().is_empty());
    }

    #[test]
    fn test_double_insert_is_duplicate() {
        let store = InMemoryLogStore::with_entries([entry(1, LogStatus::Applied)]);
        let mut tx = store.begin_transaction().unwrap();
        let err = tx.batch_insert(&[entry(1, LogStatus::Error)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Duplicate);
        assert_eq!(err.migration_id(), Some(1));
    }

    #[test]
    fn test_update_missing_row_is_not_found() {
        let store = InMemoryLogStore::new();
        let mut tx = store.begin_transaction().unwrap();
        let err = tx.batch_update(&[entry(4, LogStatus::Applied)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_rollback_discards_statements_and_rows() {
        let store = InMemoryLogStore::new();
        let mut tx = store.begin_transaction().unwrap();
        tx.execute_batch("CREATE TABLE t (id INTEGER)").unwrap();
        tx.batch_insert(&[entry(1, LogStatus::Applied)]).unwrap();
        tx.rollback().unwrap();

        assert!(store.applied_statements().is_empty());
        assert!(store.rows().is_empty());
    }

    #[test]
    fn test_injected_write_failure() {
        let store = InMemoryLogStore::new();
        store.fail_log_writes(true);
        let mut tx = store.begin_transaction().unwrap();
        let err = tx.batch_insert(&[entry(1, LogStatus::Applied)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}

//! Log Store abstraction
//!
//! A [`LogStore`] owns the migration log table and hands out
//! [`LogTransaction`]s. Schema statements and log writes made through one
//! transaction become visible together on commit, or not at all.

pub mod guard;
pub mod memory;

pub use guard::TransactionGuard;
pub use memory::InMemoryLogStore;

use crate::dispatch;
use crate::errors::{ErrorKind, MigrateError, Result};
use crate::model::{LogEntry, LogFilter, MigrationFn};

/// Executes user SQL inside the surrounding transaction
///
/// This is the only capability handed to migration callbacks.
pub trait SqlExecutor {
    /// Execute one or more `;`-separated statements
    ///
    /// # Errors
    ///
    /// Returns the store's error for the first failing statement.
    fn execute_batch(&mut self, sql: &str) -> Result<()>;
}

/// One unit of atomic work against the store
///
/// Dropping a transaction without calling [`commit`](LogTransaction::commit)
/// rolls it back.
pub trait LogTransaction: SqlExecutor {
    /// This transaction as a plain executor, for handing to callbacks
    fn executor(&mut self) -> &mut dyn SqlExecutor;

    /// Log rows in ascending ID order, optionally filtered by status
    ///
    /// A `limit` of 0 means unbounded.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row matches, `Internal` on storage failure.
    fn query(&mut self, filter: Option<LogFilter>, offset: usize, limit: usize)
        -> Result<Vec<LogEntry>>;

    /// The matching row with the highest ID
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row matches, `Internal` on storage failure.
    fn last_matching(&mut self, filter: Option<LogFilter>) -> Result<LogEntry>;

    /// Insert new rows; the store stamps `time`
    ///
    /// # Errors
    ///
    /// Returns `Duplicate` if any ID already has a row.
    fn batch_insert(&mut self, entries: &[LogEntry]) -> Result<Vec<LogEntry>>;

    /// Overwrite status and name of existing rows and refresh `time`
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if any ID has no row.
    fn batch_update(&mut self, entries: &[LogEntry]) -> Result<Vec<LogEntry>>;

    /// Run user SQL, classifying any failure as `UserSqlError`
    ///
    /// # Errors
    ///
    /// Returns `UserSqlError` wrapping the store error, or `Internal` if the
    /// store itself failed.
    fn execute_sql(&mut self, sql: &str) -> Result<()> {
        self.execute_batch(sql).map_err(user_sql_error)
    }

    /// Run a callback against this transaction's executor
    ///
    /// # Errors
    ///
    /// Returns `UserCallbackError` if the callback fails or panics.
    fn execute_callback(&mut self, callback: &MigrationFn) -> Result<()> {
        dispatch::invoke_callback(callback, self.executor())
    }

    /// # Errors
    ///
    /// Returns `Internal` if the commit fails; nothing is persisted then.
    fn commit(self: Box<Self>) -> Result<()>;

    /// # Errors
    ///
    /// Returns `Internal` if the rollback fails.
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Persistent store of the migration log
pub trait LogStore: Send {
    /// Create the log table if absent. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `Internal` on storage failure.
    fn ensure_table_exists(&self) -> Result<()>;

    /// Log rows in ascending ID order; a `limit` of 0 means unbounded
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the log is empty or the page is past its end.
    fn query(&self, offset: usize, limit: usize) -> Result<Vec<LogEntry>>;

    /// The matching row with the highest ID
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no row matches.
    fn last_matching(&self, filter: Option<LogFilter>) -> Result<LogEntry>;

    /// Open a new transaction
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the store cannot start one.
    fn begin_transaction(&self) -> Result<Box<dyn LogTransaction>>;

    /// Run user SQL in its own transaction and commit it
    ///
    /// # Errors
    ///
    /// Returns `UserSqlError` if the SQL fails (nothing is committed), or
    /// `Internal` if the transaction cannot be opened or committed.
    fn execute_sql(&self, sql: &str) -> Result<()> {
        let mut guard = TransactionGuard::new(self.begin_transaction()?, "execute_sql");
        guard.tx()?.execute_sql(sql)?;
        guard.commit()
    }

    /// Run a callback in its own transaction and commit it
    ///
    /// # Errors
    ///
    /// Returns `UserCallbackError` if the callback fails (nothing is
    /// committed), or `Internal` if the transaction cannot be opened or
    /// committed.
    fn execute_callback(&self, callback: &MigrationFn) -> Result<()> {
        let mut guard = TransactionGuard::new(self.begin_transaction()?, "execute_callback");
        guard.tx()?.execute_callback(callback)?;
        guard.commit()
    }
}

fn user_sql_error(err: MigrateError) -> MigrateError {
    // Storage failures keep their own kind
    if matches!(err.kind(), ErrorKind::UserSqlError | ErrorKind::Internal) {
        return err;
    }
    MigrateError::new(ErrorKind::UserSqlError)
        .with_op("execute_sql")
        .with_message(err.message().to_string())
        .with_source(err)
}

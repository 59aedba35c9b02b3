//! Error helpers for the SQLite store
//!
//! Maps driver and configuration failures onto the core `MigrateError`.

use dbmigrator_core::errors::{ErrorKind, MigrateError};
use dbmigrator_core::model::MigrationId;
use rusqlite::ErrorCode;

pub use dbmigrator_core::errors::Result;

/// Storage failure with no more specific classification
pub fn from_rusqlite(err: rusqlite::Error) -> MigrateError {
    persistence_error("sqlite", err)
}

/// Storage failure in `op`
pub fn persistence_error(op: &str, err: rusqlite::Error) -> MigrateError {
    MigrateError::new(ErrorKind::Internal)
        .with_op(op)
        .with_message(err.to_string())
}

/// Log row write failure; a constraint violation means the row already exists
pub fn write_error(op: &str, id: MigrationId, err: rusqlite::Error) -> MigrateError {
    let kind = if is_constraint_violation(&err) {
        ErrorKind::Duplicate
    } else {
        ErrorKind::Internal
    };
    MigrateError::new(kind)
        .with_op(op)
        .with_migration_id(id)
        .with_message(err.to_string())
}

/// Failure of a user statement run through a transaction
///
/// Busy or locked databases are storage failures, not faults in the SQL.
pub fn statement_error(op: &str, err: rusqlite::Error) -> MigrateError {
    if is_contention(&err) {
        return persistence_error(op, err);
    }
    MigrateError::new(ErrorKind::UserSqlError)
        .with_op(op)
        .with_message(err.to_string())
}

/// Store configuration could not be loaded
pub fn config_error(err: config::ConfigError) -> MigrateError {
    MigrateError::new(ErrorKind::Configuration)
        .with_op("load_config")
        .with_message(err.to_string())
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn is_contention(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

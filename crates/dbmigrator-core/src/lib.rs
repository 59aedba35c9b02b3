//! dbmigrator core: the migration model, reconciliation and the Log Store
//! abstraction.
//!
//! - Migration, catalog and log models with registration-time validation
//! - Pure reconciliation of a catalog against the persisted log
//! - `LogStore` / `LogTransaction` traits plus an in-memory implementation
//! - Action dispatch for SQL and callback actions
//! - Structured errors and the logging facility shared by all crates

pub mod dispatch;
pub mod errors;
pub mod logging_facility;
pub mod model;
pub mod reconcile;
pub mod store;

/// Re-exported so the logging macros resolve schema constants through `$crate`
pub use dbmigrator_core_types as core_types;

pub use errors::{ErrorKind, MigrateError, Result};
pub use model::{
    Action, Catalog, CatalogBuilder, LogEntry, LogFilter, LogSet, LogStatus, Migration,
    MigrationFn, MigrationId,
};
pub use reconcile::Direction;
pub use store::{InMemoryLogStore, LogStore, LogTransaction, SqlExecutor, TransactionGuard};

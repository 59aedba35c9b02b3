//! Domain model: migrations, the catalog they are registered into, and the
//! log rows that record what happened to them.

pub mod catalog;
pub mod log;
pub mod migration;

pub use catalog::{Catalog, CatalogBuilder};
pub use log::{LogEntry, LogFilter, LogSet, LogStatus, LOG_TABLE_NAME};
pub use migration::{
    Action, ActionKind, BoxError, CallbackResult, Migration, MigrationFn, MigrationId,
    MAX_NAME_LEN,
};

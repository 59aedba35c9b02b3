//! dbmigrator engine - versioned schema migrations for embedded databases
//!
//! ```no_run
//! use dbmigrator_engine::{Action, Migration, Migrator, SqliteLogStore};
//!
//! # fn main() -> dbmigrator_engine::Result<()> {
//! let migrator = Migrator::builder(SqliteLogStore::new("app.db"))
//!     .register(Migration::new(
//!         1,
//!         "create_users",
//!         Action::sql("CREATE TABLE users (id INTEGER PRIMARY KEY)"),
//!         Action::sql("DROP TABLE users"),
//!     ))
//!     .build()?;
//!
//! migrator.up(0)?;
//! assert_eq!(migrator.version()?, 1);
//! # Ok(())
//! # }
//! ```

pub mod global;
pub mod migrator;

pub use dbmigrator_core::errors::{ErrorKind, MigrateError, Result};
pub use dbmigrator_core::model::{
    Action, Catalog, CatalogBuilder, LogEntry, LogStatus, Migration, MigrationFn, MigrationId,
};
pub use dbmigrator_core::store::{InMemoryLogStore, LogStore, SqlExecutor};
pub use dbmigrator_store::{SqliteLogStore, StoreConfig};
pub use migrator::{Migrator, MigratorBuilder};

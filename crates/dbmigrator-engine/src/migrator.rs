//! Migration orchestrator
//!
//! ## Logging Ownership
//!
//! Each public operation runs inside a span carrying a fresh `run_id` and
//! owns its boundary events:
//! - `log_op_start!` at entry
//! - `log_op_end!` on success
//! - `log_op_error!` on failure
//!
//! Per-migration progress is logged at info with `migration_id`,
//! `direction` and `outcome`. Lower layers only use `tracing::debug!`.
//!
//! ## Commit granularity
//!
//! Up and Down commit every action in its own transaction and record the
//! outcomes in a separate bookkeeping transaction. A failing action stops
//! the batch; earlier actions stay applied and are logged as such. Redo
//! runs Down, Up and the log refresh in one transaction, so it either
//! fully succeeds or leaves everything unchanged.

use std::time::Instant;

use dbmigrator_core::dispatch;
use dbmigrator_core::errors::{internal, not_found, ErrorKind, Result};
use dbmigrator_core::model::{
    Catalog, CatalogBuilder, LogEntry, LogFilter, LogSet, LogStatus, Migration, MigrationId,
};
use dbmigrator_core::reconcile::{self, Direction};
use dbmigrator_core::store::{LogStore, LogTransaction, TransactionGuard};
use dbmigrator_core::{log_op_end, log_op_error, log_op_start};
use dbmigrator_core_types::schema::{OUTCOME_DONE, OUTCOME_ERROR};
use dbmigrator_core_types::RunId;
use dbmigrator_store::{SqliteLogStore, StoreConfig};

/// Applies and reverts migrations from a catalog against a Log Store
pub struct Migrator {
    catalog: Catalog,
    store: Box<dyn LogStore>,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("migrations", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

impl Migrator {
    /// Start registering migrations for `store`
    pub fn builder(store: impl LogStore + 'static) -> MigratorBuilder {
        MigratorBuilder {
            store: Box::new(store),
            catalog: CatalogBuilder::new(),
        }
    }

    /// Builder over a SQLite store described by `config`
    pub fn sqlite(config: &StoreConfig) -> MigratorBuilder {
        Self::builder(SqliteLogStore::from_config(config))
    }

    /// Engine over an already validated catalog; creates the log table
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the log table cannot be created.
    pub fn new(catalog: Catalog, store: impl LogStore + 'static) -> Result<Self> {
        Self::from_boxed(catalog, Box::new(store))
    }

    fn from_boxed(catalog: Catalog, store: Box<dyn LogStore>) -> Result<Self> {
        let migrator = Self { catalog, store };
        migrator.ensure_table()?;
        Ok(migrator)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Create the log table if it does not exist
    ///
    /// # Errors
    ///
    /// Returns `Internal` on storage failure.
    pub fn ensure_table(&self) -> Result<()> {
        self.store.ensure_table_exists()
    }

    /// Register another migration after construction
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if the ID is taken, `InvalidMigration` if the
    /// migration fails validation.
    pub fn register(&mut self, migration: Migration) -> Result<()> {
        let id = migration.id;
        self.catalog.insert(migration)?;
        tracing::debug!(migration_id = id, "registered migration");
        Ok(())
    }

    /// Apply pending migrations in ascending order; `quantity < 1` means all
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when nothing is pending, the failing action's
    /// error (carrying its migration ID) if one fails, or the bookkeeping
    /// error if the log cannot be written.
    pub fn up(&self, quantity: i64) -> Result<()> {
        self.observe("up", || self.run_batch(Direction::Up, quantity))
    }

    /// Revert applied migrations in descending order; `quantity < 1` means 1
    ///
    /// # Errors
    ///
    /// Same as [`up`](Migrator::up).
    pub fn down(&self, quantity: i64) -> Result<()> {
        self.observe("down", || self.run_batch(Direction::Down, quantity))
    }

    /// Revert and re-apply the most recently applied migration atomically
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if nothing is applied or the last applied ID is
    /// not registered, or the failing action's error; in every error case
    /// schema and log are left unchanged.
    pub fn redo(&self) -> Result<()> {
        self.observe("redo", || self.redo_impl())
    }

    /// Every log row in ascending ID order; empty when nothing was logged
    ///
    /// # Errors
    ///
    /// Returns `Internal` on storage failure.
    pub fn status(&self) -> Result<Vec<LogEntry>> {
        self.status_page(0, 0)
    }

    /// One page of [`status`](Migrator::status); a `limit` of 0 means
    /// unbounded
    ///
    /// # Errors
    ///
    /// Returns `Internal` on storage failure.
    pub fn status_page(&self, offset: usize, limit: usize) -> Result<Vec<LogEntry>> {
        self.observe("status", || {
            or_empty(self.store.query(offset, limit), Vec::new)
        })
    }

    /// Highest applied migration ID, or 0 when nothing is applied
    ///
    /// # Errors
    ///
    /// Returns `Internal` on storage failure.
    pub fn version(&self) -> Result<MigrationId> {
        self.observe("version", || {
            or_empty(
                self.store
                    .last_matching(Some(LogFilter::applied()))
                    .map(|entry| entry.id),
                || 0,
            )
        })
    }

    fn observe<T>(&self, op: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let run_id = RunId::new();
        let span = tracing::info_span!("dbmigrator", op = op, run_id = %run_id);
        let _entered = span.enter();

        log_op_start!(op);
        let start = Instant::now();
        match f() {
            Ok(value) => {
                log_op_end!(op, duration_ms = start.elapsed().as_millis() as u64);
                Ok(value)
            }
            Err(err) => {
                log_op_error!(op, &err, duration_ms = start.elapsed().as_millis() as u64);
                Err(err)
            }
        }
    }

    fn run_batch(&self, direction: Direction, quantity: i64) -> Result<()> {
        let op = direction.as_str();
        let mut guard = TransactionGuard::new(self.store.begin_transaction()?, op);
        let prior = read_log(guard.tx()?)?;
        let targets = reconcile::plan(&self.catalog, &prior, direction, quantity)?;
        tracing::debug!(
            direction = op,
            quantity = quantity,
            batch_len = targets.len(),
            "planned batch"
        );

        let success = match direction {
            Direction::Up => LogStatus::Applied,
            Direction::Down => LogStatus::NotApplied,
        };

        let mut outcomes = Vec::with_capacity(targets.len());
        let mut failure = None;
        for id in targets {
            let migration = self.migration(id, op)?;
            let action = match direction {
                Direction::Up => &migration.up,
                Direction::Down => &migration.down,
            };

            match dispatch::run_self_committing(self.store.as_ref(), action) {
                Ok(()) => {
                    tracing::info!(migration_id = id, direction = op, outcome = OUTCOME_DONE);
                    outcomes.push(migration.log_entry(success));
                }
                Err(err) => {
                    tracing::warn!(migration_id = id, direction = op, outcome = OUTCOME_ERROR);
                    outcomes.push(migration.log_entry(LogStatus::Error));
                    failure = Some(
                        err.with_migration_id(id)
                            .context(op, format!("{} error on migration #{}", op, id)),
                    );
                    break;
                }
            }
        }

        let writes = reconcile::classify(&prior, outcomes);
        let tx = guard.tx()?;
        if !writes.to_update.is_empty() {
            tx.batch_update(&writes.to_update).map_err(|e| {
                e.context(format!("{}.batch_update", op), "cannot update migration log")
            })?;
        }
        if !writes.to_create.is_empty() {
            tx.batch_insert(&writes.to_create).map_err(|e| {
                e.context(format!("{}.batch_insert", op), "cannot create migration log")
            })?;
        }
        guard.commit()?;

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn redo_impl(&self) -> Result<()> {
        let mut guard = TransactionGuard::new(self.store.begin_transaction()?, "redo");
        let last = guard
            .tx()?
            .last_matching(Some(LogFilter::applied()))
            .map_err(|e| e.context("redo", "no applied migration to redo"))?;
        let id = last.id;
        let migration = self.catalog.get(id).ok_or_else(|| {
            not_found("redo", format!("migration #{} is not registered", id)).with_migration_id(id)
        })?;

        let tx = guard.tx()?;
        dispatch::run_scoped(tx, &migration.down).map_err(|e| {
            e.with_migration_id(id)
                .context("redo.down", format!("down error on migration #{}", id))
        })?;
        dispatch::run_scoped(tx, &migration.up).map_err(|e| {
            e.with_migration_id(id)
                .context("redo.up", format!("up error on migration #{}", id))
        })?;
        tx.batch_update(&[migration.log_entry(LogStatus::Applied)])
            .map_err(|e| e.context("redo.batch_update", "cannot update migration log"))?;
        guard.commit()?;

        tracing::info!(migration_id = id, direction = "redo", outcome = OUTCOME_DONE);
        Ok(())
    }

    fn migration(&self, id: MigrationId, op: &str) -> Result<&Migration> {
        self.catalog
            .get(id)
            .ok_or_else(|| internal(op, format!("planned migration #{} is not registered", id)))
    }
}

/// Collects registrations, then validates them and bootstraps the store
pub struct MigratorBuilder {
    store: Box<dyn LogStore>,
    catalog: CatalogBuilder,
}

impl MigratorBuilder {
    pub fn register(mut self, migration: Migration) -> Self {
        self.catalog.add(migration);
        self
    }

    pub fn add(&mut self, migration: Migration) -> &mut Self {
        self.catalog.add(migration);
        self
    }

    /// Replace the registrations collected so far
    pub fn with_catalog(mut self, catalog: CatalogBuilder) -> Self {
        self.catalog = catalog;
        self
    }

    /// Validate the catalog, then create the log table
    ///
    /// # Errors
    ///
    /// Returns the aggregated registration errors without touching the
    /// store, or `Internal` if the log table cannot be created.
    pub fn build(self) -> Result<Migrator> {
        let catalog = self.catalog.build()?;
        Migrator::from_boxed(catalog, self.store)
    }
}

/// The whole log as seen through `tx`
fn read_log(tx: &mut dyn LogTransaction) -> Result<LogSet> {
    or_empty(tx.query(None, 0, 0).map(LogSet::from_entries), LogSet::new)
}

/// Map `NotFound` to an empty value
fn or_empty<T>(result: Result<T>, empty: impl FnOnce() -> T) -> Result<T> {
    match result {
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(empty()),
        other => other,
    }
}

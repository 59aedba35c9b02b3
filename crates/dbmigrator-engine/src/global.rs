//! Process-wide migrator
//!
//! For hosts that prefer registering migrations from anywhere in the
//! program and driving a single engine: [`add`] collects migrations,
//! [`init`] builds the engine once, and the remaining functions forward to
//! it. Any call before a successful [`init`] fails with `NotInitialised`.

use std::sync::{Mutex, MutexGuard, OnceLock};

use dbmigrator_core::errors::{internal, ErrorKind, MigrateError, Result};
use dbmigrator_core::model::{CatalogBuilder, LogEntry, Migration, MigrationId};
use dbmigrator_core::store::LogStore;

use crate::migrator::Migrator;

static PENDING: OnceLock<Mutex<CatalogBuilder>> = OnceLock::new();
static MIGRATOR: OnceLock<Mutex<Migrator>> = OnceLock::new();

fn lock<'a, T>(cell: &'a Mutex<T>, op: &str) -> Result<MutexGuard<'a, T>> {
    cell.lock()
        .map_err(|_| internal(op, "global migrator lock poisoned"))
}

fn engine(op: &str) -> Result<MutexGuard<'static, Migrator>> {
    match MIGRATOR.get() {
        Some(cell) => lock(cell, op),
        None => Err(MigrateError::new(ErrorKind::NotInitialised)
            .with_op(op)
            .with_message("call dbmigrator_engine::global::init first")),
    }
}

/// Register a migration
///
/// Before [`init`], failures are collected and reported by [`init`]. After
/// it, the migration goes straight into the running engine.
///
/// # Errors
///
/// After [`init`]: `BadRequest` if the ID is taken, `InvalidMigration` if
/// the migration is malformed.
pub fn add(migration: Migration) -> Result<()> {
    let mut pending = lock(pending(), "add")?;
    // init publishes the engine while holding the pending lock
    if let Some(cell) = MIGRATOR.get() {
        drop(pending);
        return lock(cell, "add")?.register(migration);
    }
    pending.add(migration);
    Ok(())
}

fn pending() -> &'static Mutex<CatalogBuilder> {
    PENDING.get_or_init(|| Mutex::new(CatalogBuilder::new()))
}

/// Build the global engine from everything [`add`]ed so far
///
/// The pending registrations are kept until an engine is built from them,
/// so after a failure every later call fails the same way. Registration
/// failures are reported without touching the store.
///
/// # Errors
///
/// Returns the aggregated registration errors, the store's bootstrap
/// error, or `BadRequest` if already initialised.
pub fn init(store: impl LogStore + 'static) -> Result<()> {
    let mut pending = lock(pending(), "init")?;
    if MIGRATOR.get().is_some() {
        return Err(already_initialised());
    }
    let migrator = Migrator::builder(store)
        .with_catalog(pending.clone())
        .build()?;
    MIGRATOR
        .set(Mutex::new(migrator))
        .map_err(|_| already_initialised())?;
    *pending = CatalogBuilder::new();
    Ok(())
}

fn already_initialised() -> MigrateError {
    MigrateError::new(ErrorKind::BadRequest)
        .with_op("init")
        .with_message("global migrator is already initialised")
}

/// See [`Migrator::up`]
///
/// # Errors
///
/// `NotInitialised` before [`init`], otherwise as [`Migrator::up`].
pub fn up(quantity: i64) -> Result<()> {
    engine("up")?.up(quantity)
}

/// See [`Migrator::down`]
///
/// # Errors
///
/// `NotInitialised` before [`init`], otherwise as [`Migrator::down`].
pub fn down(quantity: i64) -> Result<()> {
    engine("down")?.down(quantity)
}

/// See [`Migrator::redo`]
///
/// # Errors
///
/// `NotInitialised` before [`init`], otherwise as [`Migrator::redo`].
pub fn redo() -> Result<()> {
    engine("redo")?.redo()
}

/// See [`Migrator::status`]
///
/// # Errors
///
/// `NotInitialised` before [`init`], otherwise as [`Migrator::status`].
pub fn status() -> Result<Vec<LogEntry>> {
    engine("status")?.status()
}

/// See [`Migrator::version`]
///
/// # Errors
///
/// `NotInitialised` before [`init`], otherwise as [`Migrator::version`].
pub fn version() -> Result<MigrationId> {
    engine("version")?.version()
}

//! dbmigrator store - SQLite persistence for the migration log
//!
//! Provides:
//! - `SqliteLogStore`, a `LogStore` backed by a database file
//! - Connection helpers (busy timeout, journal mode)
//! - `StoreConfig`, loaded from file and environment

pub mod config;
pub mod db;
pub mod errors;
pub mod sqlite_store;

pub use crate::config::{JournalMode, StoreConfig};
pub use errors::Result;
pub use sqlite_store::{SqliteLogStore, SqliteTransaction};

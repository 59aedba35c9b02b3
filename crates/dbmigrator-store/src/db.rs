//! Connection management

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;

use crate::config::JournalMode;
use crate::errors::{from_rusqlite, persistence_error, Result};

/// Per-connection settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub busy_timeout: Duration,
    pub journal_mode: JournalMode,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5_000),
            journal_mode: JournalMode::Wal,
        }
    }
}

/// Open and configure a connection to the database at `path`
///
/// # Errors
///
/// Returns `Internal` if the file cannot be opened or configured.
pub fn open<P: AsRef<Path>>(path: P, options: &ConnectionOptions) -> Result<Connection> {
    let conn = Connection::open(path).map_err(from_rusqlite)?;
    configure(&conn, options)?;
    Ok(conn)
}

/// Apply busy timeout and journal mode
///
/// # Errors
///
/// Returns `Internal` if a pragma is rejected.
pub fn configure(conn: &Connection, options: &ConnectionOptions) -> Result<()> {
    conn.busy_timeout(options.busy_timeout)
        .map_err(|e| persistence_error("busy_timeout", e))?;

    // journal_mode reports the resulting mode as a row
    let mode: String = conn
        .pragma_update_and_check(None, "journal_mode", options.journal_mode.as_str(), |row| {
            row.get(0)
        })
        .map_err(|e| persistence_error("journal_mode", e))?;
    tracing::trace!(journal_mode = %mode, "configured connection");

    Ok(())
}

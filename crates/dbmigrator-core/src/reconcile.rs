//! Reconciliation: decide which migrations a batch touches and how their
//! outcomes are written back. Pure functions, no I/O.

use std::fmt;

use crate::errors::{not_found, Result};
use crate::model::{Catalog, LogEntry, LogSet, MigrationId};

/// Quantity used by Down when the caller asks for less than one
pub const DEFAULT_DOWN_QUANTITY: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered migration IDs a batch should process
///
/// Up: catalog IDs not applied in `log`, ascending; `quantity < 1` means all.
/// Down: catalog IDs applied in `log`, descending; `quantity < 1` means
/// [`DEFAULT_DOWN_QUANTITY`]. Quantities above the candidate count are
/// clamped.
///
/// # Errors
///
/// Returns `NotFound` when there is nothing to do.
pub fn plan(
    catalog: &Catalog,
    log: &LogSet,
    direction: Direction,
    quantity: i64,
) -> Result<Vec<MigrationId>> {
    let candidates: Vec<MigrationId> = match direction {
        Direction::Up => catalog.ids().filter(|id| !log.is_applied(*id)).collect(),
        Direction::Down => catalog.ids().rev().filter(|id| log.is_applied(*id)).collect(),
    };

    let wanted = if quantity >= 1 {
        usize::try_from(quantity).unwrap_or(usize::MAX)
    } else {
        match direction {
            Direction::Up => candidates.len(),
            Direction::Down => DEFAULT_DOWN_QUANTITY,
        }
    };

    let targets: Vec<MigrationId> = candidates.into_iter().take(wanted).collect();
    if targets.is_empty() {
        return Err(not_found(
            direction.as_str(),
            format!("no migrations to run {}", direction),
        ));
    }
    Ok(targets)
}

/// Log rows a batch must write, split by whether a row already exists
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LogWrites {
    pub to_update: Vec<LogEntry>,
    pub to_create: Vec<LogEntry>,
}

impl LogWrites {
    pub fn len(&self) -> usize {
        self.to_update.len() + self.to_create.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split batch outcomes into updates (row exists in `prior`) and creates
pub fn classify(prior: &LogSet, outcomes: Vec<LogEntry>) -> LogWrites {
    let (to_update, to_create) = outcomes
        .into_iter()
        .partition(|entry| prior.contains(entry.id));
    LogWrites {
        to_update,
        to_create,
    }
}

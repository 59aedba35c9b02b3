use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::{CatalogError, ErrorKind, MigrateError};
use crate::model::log::{LogEntry, LogStatus};
use crate::store::SqlExecutor;

/// Migration identifier; also the total order key
pub type MigrationId = u32;

/// Maximum length of a migration name (matches the `name` column width)
pub const MAX_NAME_LEN: usize = 100;

/// Error type returned by migration callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by migration callbacks
pub type CallbackResult = std::result::Result<(), BoxError>;

/// A migration callback.
///
/// Receives the statement executor of the transaction it runs in; it must
/// not try to commit or roll back.
#[derive(Clone)]
pub struct MigrationFn(Arc<dyn Fn(&mut dyn SqlExecutor) -> CallbackResult + Send + Sync>);

impl MigrationFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut dyn SqlExecutor) -> CallbackResult + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Invoke the callback
    pub fn call(&self, executor: &mut dyn SqlExecutor) -> CallbackResult {
        (self.0)(executor)
    }
}

impl fmt::Debug for MigrationFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MigrationFn(..)")
    }
}

/// The two action representations a migration direction can take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Sql,
    Callback,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Sql => "sql",
            ActionKind::Callback => "callback",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses the type tag external loaders use to describe an action.
///
/// `"go"` is accepted as an alias of `"callback"` for loaders that still emit
/// the historical tag.
impl FromStr for ActionKind {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sql" => Ok(ActionKind::Sql),
            "callback" | "go" => Ok(ActionKind::Callback),
            other => Err(MigrateError::new(ErrorKind::UndefinedActionType)
                .with_op("parse_action_kind")
                .with_message(format!("Undefined type of action: {:?}", other))),
        }
    }
}

/// Up or Down action of a migration
#[derive(Debug, Clone)]
pub enum Action {
    /// Plain SQL text, executed as a statement batch
    Sql(String),
    /// A callback handed the transaction's executor
    Callback(MigrationFn),
}

impl Action {
    pub fn sql(text: impl Into<String>) -> Self {
        Action::Sql(text.into())
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&mut dyn SqlExecutor) -> CallbackResult + Send + Sync + 'static,
    {
        Action::Callback(MigrationFn::new(f))
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Sql(_) => ActionKind::Sql,
            Action::Callback(_) => ActionKind::Callback,
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Action::Sql(text) if text.trim().is_empty())
    }
}

/// A named, versioned unit of schema change
#[derive(Debug, Clone)]
pub struct Migration {
    pub id: MigrationId,
    pub name: String,
    pub up: Action,
    pub down: Action,
}

impl Migration {
    pub fn new(id: MigrationId, name: impl Into<String>, up: Action, down: Action) -> Self {
        Self {
            id,
            name: name.into(),
            up,
            down,
        }
    }

    /// Structural validation applied at registration
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found: zero ID, a name that is
    /// empty, longer than [`MAX_NAME_LEN`] or outside `[A-Za-z0-9_-]`, or an
    /// empty SQL action.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.id == 0 {
            return Err(CatalogError::ZeroId);
        }
        validate_name(self.id, &self.name)?;
        if self.up.is_empty() {
            return Err(CatalogError::EmptyAction {
                id: self.id,
                direction: "up",
            });
        }
        if self.down.is_empty() {
            return Err(CatalogError::EmptyAction {
                id: self.id,
                direction: "down",
            });
        }
        Ok(())
    }

    /// Build a log entry snapshotting this migration's name
    pub fn log_entry(&self, status: LogStatus) -> LogEntry {
        LogEntry::new(self.id, status, self.name.clone())
    }
}

fn validate_name(id: MigrationId, name: &str) -> Result<(), CatalogError> {
    let invalid = |reason: &str| CatalogError::InvalidName {
        id,
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(invalid("name is longer than 100 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid("only letters, digits, '_' and '-' are allowed"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_migration(id: MigrationId, name: &str) -> Migration {
        Migration::new(
            id,
            name,
            Action::sql("CREATE TABLE t (id INTEGER)"),
            Action::sql("DROP TABLE t"),
        )
    }

    #[test]
    fn test_valid_migration_passes() {
        assert!(sql_migration(1, "first_migration").validate().is_ok());
    }

    #[test]
    fn test_zero_id_rejected() {
        assert_eq!(
            sql_migration(0, "init").validate(),
            Err(CatalogError::ZeroId)
        );
    }

    #[test]
    fn test_bad_names_rejected() {
        let long = "x".repeat(101);
        for name in ["", "has space", "semi;colon", long.as_str()] {
            let result = sql_migration(1, name).validate();
            assert!(
                matches!(result, Err(CatalogError::InvalidName { .. })),
                "name {:?} should be rejected",
                name
            );
        }
    }

    #[test]
    fn test_empty_sql_rejected() {
        let m = Migration::new(1, "init", Action::sql("  "), Action::sql("DROP TABLE t"));
        assert_eq!(
            m.validate(),
            Err(CatalogError::EmptyAction {
                id: 1,
                direction: "up"
            })
        );
    }

    #[test]
    fn test_callback_action_is_never_empty() {
        let m = Migration::new(
            1,
            "func",
            Action::callback(|_| Ok(())),
            Action::callback(|_| Ok(())),
        );
        assert!(m.validate().is_ok());
        assert_eq!(m.up.kind(), ActionKind::Callback);
    }

    #[test]
    fn test_action_kind_parse() {
        assert_eq!("sql".parse::<ActionKind>().unwrap(), ActionKind::Sql);
        assert_eq!("go".parse::<ActionKind>().unwrap(), ActionKind::Callback);

        let err = "yaml".parse::<ActionKind>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedActionType);
    }
}

//! Action dispatch
//!
//! Runs a migration's Up or Down action either in its own committed
//! transaction or inside a caller-owned one.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::errors::{ErrorKind, MigrateError, Result};
use crate::model::{Action, MigrationFn};
use crate::store::{LogStore, LogTransaction, SqlExecutor};

/// Run `action` in a transaction of its own, committed on success
///
/// # Errors
///
/// Returns `UserSqlError` or `UserCallbackError` when the action fails, in
/// which case nothing it did is persisted.
pub fn run_self_committing(store: &dyn LogStore, action: &Action) -> Result<()> {
    match action {
        Action::Sql(sql) => store.execute_sql(sql),
        Action::Callback(cb) => store.execute_callback(cb),
    }
}

/// Run `action` inside `tx` without committing
///
/// # Errors
///
/// Returns `UserSqlError` or `UserCallbackError` when the action fails; the
/// caller decides whether to roll back.
pub fn run_scoped(tx: &mut dyn LogTransaction, action: &Action) -> Result<()> {
    match action {
        Action::Sql(sql) => tx.execute_sql(sql),
        Action::Callback(cb) => tx.execute_callback(cb),
    }
}

/// Call a user callback, turning returned errors and panics into
/// `UserCallbackError`
///
/// # Errors
///
/// Returns `UserCallbackError` carrying the callback's message.
pub fn invoke_callback(callback: &MigrationFn, executor: &mut dyn SqlExecutor) -> Result<()> {
    match catch_unwind(AssertUnwindSafe(|| callback.call(executor))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(callback_error(err.to_string())),
        Err(payload) => Err(callback_error(format!(
            "callback panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn callback_error(message: String) -> MigrateError {
    MigrateError::new(ErrorKind::UserCallbackError)
        .with_op("execute_callback")
        .with_message(message)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLogStore;

    #[test]
    fn test_sql_failure_is_user_sql_error() {
        let store = InMemoryLogStore::new().fail_on_sql("BROKEN");
        let err = run_self_committing(&store, &Action::sql("BROKEN")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserSqlError);
        assert!(store.applied_statements().is_empty());
    }

    #[test]
    fn test_self_committing_sql_is_persisted() {
        let store = InMemoryLogStore::new();
        run_self_committing(&store, &Action::sql("CREATE TABLE t (id INTEGER)")).unwrap();
        assert_eq!(
            store.applied_statements(),
            vec!["CREATE TABLE t (id INTEGER)".to_string()]
        );
    }

    #[test]
    fn test_callback_error_message_is_kept() {
        let store = InMemoryLogStore::new();
        let action = Action::callback(|_| Err("nope".into()));
        let err = run_self_committing(&store, &action).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserCallbackError);
        assert_eq!(err.message(), "nope");
    }

    #[test]
    fn test_callback_panic_is_captured() {
        let store = InMemoryLogStore::new();
        let action = Action::callback(|_| panic!("kaboom"));
        let err = run_self_committing(&store, &action).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UserCallbackError);
        assert!(err.message().contains("kaboom"));
    }

    #[test]
    fn test_scoped_action_waits_for_commit() {
        let store = InMemoryLogStore::new();
        let mut tx = store.begin_transaction().unwrap();
        run_scoped(tx.as_mut(), &Action::callback(|exec| {
            exec.execute_batch("CREATE TABLE t (id INTEGER)")?;
            Ok(())
        }))
        .unwrap();
        assert!(store.applied_statements().is_empty());

        tx.commit().unwrap();
        assert_eq!(store.applied_statements().len(), 1);
    }
}

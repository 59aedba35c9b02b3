use dbmigrator_core::errors::ErrorKind;
use dbmigrator_core::model::{LogEntry, LogFilter, LogStatus, MigrationFn};
use dbmigrator_core::store::{InMemoryLogStore, LogStore, TransactionGuard};

#[test]
fn test_self_committing_sql_rolls_back_on_failure() {
    // GIVEN a store that rejects one statement
    let store = InMemoryLogStore::new().fail_on_sql("DROP TABLE missing");

    // WHEN the good statement runs, then the bad one
    store.execute_sql("CREATE TABLE t (id INTEGER)").unwrap();
    let err = store.execute_sql("DROP TABLE missing").unwrap_err();

    // THEN only the good statement was committed
    assert_eq!(err.kind(), ErrorKind::UserSqlError);
    assert_eq!(
        store.applied_statements(),
        vec!["CREATE TABLE t (id INTEGER)".to_string()]
    );
}

#[test]
fn test_self_committing_callback_discards_partial_work() {
    // GIVEN a callback that writes, then fails
    let store = InMemoryLogStore::new();
    let cb = MigrationFn::new(|exec| {
        exec.execute_batch("INSERT INTO t VALUES (1)")?;
        Err("validation failed".into())
    });

    // WHEN it runs self-committing
    let err = store.execute_callback(&cb).unwrap_err();

    // THEN nothing from it is visible
    assert_eq!(err.kind(), ErrorKind::UserCallbackError);
    assert!(store.applied_statements().is_empty());
}

#[test]
fn test_transactional_status_filter() {
    let store = InMemoryLogStore::with_entries([
        LogEntry::new(1, LogStatus::Applied, "a"),
        LogEntry::new(2, LogStatus::Error, "b"),
        LogEntry::new(3, LogStatus::Applied, "c"),
    ]);
    let mut guard = TransactionGuard::new(store.begin_transaction().unwrap(), "test");
    let tx = guard.tx().unwrap();

    let applied: Vec<_> = tx
        .query(Some(LogFilter::applied()), 0, 0)
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(applied, vec![1, 3]);

    let errors = tx.query(Some(LogFilter::status(LogStatus::Error)), 0, 0).unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].name, "b");

    let err = tx
        .query(Some(LogFilter::status(LogStatus::NotApplied)), 0, 0)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_update_refreshes_time_and_name() {
    // GIVEN an old Error row
    let mut old = LogEntry::new(1, LogStatus::Error, "old_name");
    old.time = chrono::DateTime::from_timestamp_millis(0).unwrap();
    let store = InMemoryLogStore::with_entries([old.clone()]);

    // WHEN it is updated to Applied under a new name and committed
    let mut guard = TransactionGuard::new(store.begin_transaction().unwrap(), "test");
    guard
        .tx()
        .unwrap()
        .batch_update(&[LogEntry::new(1, LogStatus::Applied, "new_name")])
        .unwrap();
    guard.commit().unwrap();

    // THEN status, name and time all changed
    let rows = store.rows();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, LogStatus::Applied);
    assert_eq!(rows[0].name, "new_name");
    assert!(rows[0].time > old.time);
}

#[test]
fn test_clones_share_state() {
    let store = InMemoryLogStore::new();
    let handle = store.clone();
    store.execute_sql("SELECT 1").unwrap();
    assert_eq!(handle.applied_statements().len(), 1);
    assert!(handle.storage_calls() > 0);
}

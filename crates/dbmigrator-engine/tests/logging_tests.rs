//! Boundary logging emitted by the orchestrator

use dbmigrator_core::logging_facility::init_test_capture;
use dbmigrator_core_types::schema::{EVENT_END, EVENT_END_ERROR, EVENT_START};
use dbmigrator_engine::{Action, InMemoryLogStore, Migration, Migrator};

#[test]
fn test_up_emits_start_end_and_per_migration_outcome() {
    let capture = init_test_capture();
    let store = InMemoryLogStore::new();
    // Unique name so parallel tests sharing the capture do not interfere
    let m = Migrator::builder(store)
        .register(Migration::new(
            4101,
            "logging_probe",
            Action::sql("CREATE TABLE logging_probe (id INTEGER)"),
            Action::sql("DROP TABLE logging_probe"),
        ))
        .build()
        .unwrap();

    m.up(0).unwrap();

    let starts = capture.events_for("up", EVENT_START);
    let ends = capture.events_for("up", EVENT_END);
    assert!(!starts.is_empty());
    assert!(!ends.is_empty());
    assert!(ends.iter().all(|e| e.field("duration_ms").is_some()));
    assert!(ends.iter().all(|e| e.field("run_id").is_some()));

    let outcome = capture.count_events(|e| {
        e.field("migration_id") == Some("4101") && e.field("outcome") == Some("done")
    });
    assert_eq!(outcome, 1);
}

#[test]
fn test_failed_operation_emits_end_error_with_code() {
    let capture = init_test_capture();
    let m = Migrator::builder(InMemoryLogStore::new())
        .register(Migration::new(
            4202,
            "never_applied",
            Action::sql("SELECT 1"),
            Action::sql("SELECT 1"),
        ))
        .build()
        .unwrap();

    // Nothing applied yet, so redo has nothing to do
    m.redo().unwrap_err();

    let errors = capture.events_for("redo", EVENT_END_ERROR);
    assert!(errors
        .iter()
        .any(|e| e.field("err.code") == Some("ERR_NOT_FOUND")));
}

use dbmigrator_core::errors::{ErrorKind, MigrateError};
use dbmigrator_core::model::{Action, CatalogBuilder, Migration};

fn sql(id: u32, name: &str) -> Migration {
    Migration::new(
        id,
        name,
        Action::sql("CREATE TABLE t (id INTEGER)"),
        Action::sql("DROP TABLE t"),
    )
}

#[test]
fn test_duplicate_id_fails_build_with_duplicate_kind() {
    // GIVEN two registrations sharing ID 5
    let builder = CatalogBuilder::new()
        .register(sql(5, "first"))
        .register(sql(5, "second"));

    // WHEN building
    let err = builder.build().unwrap_err();

    // THEN the aggregate reports Duplicate for migration 5
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    assert_eq!(err.causes().len(), 1);
    assert_eq!(err.causes()[0].migration_id(), Some(5));
}

#[test]
fn test_all_registration_errors_are_reported_together() {
    // GIVEN several independently broken migrations
    let builder = CatalogBuilder::new()
        .register(sql(0, "zero"))
        .register(sql(2, "bad name"))
        .register(Migration::new(3, "empty_down", Action::sql("SELECT 1"), Action::sql("")))
        .register(sql(4, "fine"));

    // WHEN building
    let err: MigrateError = builder.build().unwrap_err();

    // THEN each failure is a separate cause, in registration order
    assert_eq!(err.kind(), ErrorKind::InvalidMigration);
    let ids: Vec<_> = err.causes().iter().map(|c| c.migration_id()).collect();
    assert_eq!(ids, vec![None, Some(2), Some(3)]);
    assert!(err.message().starts_with("3 migration registration error"));
}

#[test]
fn test_aggregate_kind_follows_first_failure() {
    let err = CatalogBuilder::new()
        .register(sql(1, "ok"))
        .register(sql(7, "has space"))
        .register(sql(1, "again"))
        .build()
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidMigration);
    assert!(err.causes()[1].has_kind(ErrorKind::Duplicate));
    // The aggregate itself answers for every cause
    assert!(err.has_kind(ErrorKind::Duplicate));
}

#[test]
fn test_check_reports_failures_without_consuming() {
    let mut builder = CatalogBuilder::new();
    builder.add(sql(5, "a")).add(sql(5, "b"));

    // Repeated checks keep failing with the same aggregate
    let first = builder.check().unwrap_err();
    let second = builder.check().unwrap_err();
    assert_eq!(first, second);
    assert_eq!(first.kind(), ErrorKind::Duplicate);
    assert_eq!(builder.build().unwrap_err(), first);
}

#[test]
fn test_valid_catalog_lookup() {
    let catalog = CatalogBuilder::new()
        .register(sql(10, "ten"))
        .register(sql(2, "two"))
        .build()
        .unwrap();

    assert_eq!(catalog.len(), 2);
    assert_eq!(catalog.get(10).map(|m| m.name.as_str()), Some("ten"));
    assert!(catalog.get(3).is_none());
    assert_eq!(catalog.iter().map(|m| m.id).collect::<Vec<_>>(), vec![2, 10]);
}

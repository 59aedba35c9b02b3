//! A process whose global registrations are broken. Kept apart from the
//! lifecycle test because the failed state is permanent for the binary.

use dbmigrator_engine::global;
use dbmigrator_engine::{Action, ErrorKind, InMemoryLogStore, Migration};

fn migration(id: u32, name: &str) -> Migration {
    Migration::new(
        id,
        name,
        Action::sql(format!("CREATE TABLE t{} (id INTEGER)", id)),
        Action::sql(format!("DROP TABLE t{}", id)),
    )
}

#[test]
fn test_failed_init_stays_failed() {
    // GIVEN two registrations sharing ID 5
    global::add(migration(5, "a")).unwrap();
    global::add(migration(5, "b")).unwrap();

    // WHEN initialising
    let store = InMemoryLogStore::new();
    let err = global::init(store.clone()).unwrap_err();

    // THEN it fails with Duplicate before any storage call
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    assert_eq!(store.storage_calls(), 0);

    // WHEN retrying init
    let err = global::init(store.clone()).unwrap_err();

    // THEN the same failure is returned and the store is still untouched
    assert_eq!(err.kind(), ErrorKind::Duplicate);
    assert_eq!(store.storage_calls(), 0);
    assert!(!store.table_exists());

    // AND no engine exists
    assert_eq!(global::up(0).unwrap_err().kind(), ErrorKind::NotInitialised);
    assert_eq!(global::version().unwrap_err().kind(), ErrorKind::NotInitialised);
}

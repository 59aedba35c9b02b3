use std::collections::BTreeMap;

use crate::errors::{CatalogError, MigrateError, Result};
use crate::model::{Migration, MigrationId};

/// Validated, duplicate-free set of migrations keyed by ID
///
/// Only obtainable from [`CatalogBuilder::build`], so holding a `Catalog`
/// means every migration in it passed validation.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    migrations: BTreeMap<MigrationId, Migration>,
}

impl Catalog {
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::new()
    }

    pub fn get(&self, id: MigrationId) -> Option<&Migration> {
        self.migrations.get(&id)
    }

    pub fn contains(&self, id: MigrationId) -> bool {
        self.migrations.contains_key(&id)
    }

    /// IDs in ascending order
    pub fn ids(&self) -> impl DoubleEndedIterator<Item = MigrationId> + '_ {
        self.migrations.keys().copied()
    }

    /// Migrations in ascending ID order
    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.values()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Add a migration to an already-built catalog.
    ///
    /// Existing entries are never replaced.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if the ID is already registered, or
    /// `InvalidMigration` if the migration fails validation.
    pub fn insert(&mut self, migration: Migration) -> Result<()> {
        if self.migrations.contains_key(&migration.id) {
            return Err(CatalogError::AlreadyRegistered { id: migration.id }.into());
        }
        migration.validate()?;
        self.migrations.insert(migration.id, migration);
        Ok(())
    }
}

/// Accumulates registrations and their failures
///
/// Registration never fails eagerly: every problem is recorded and reported
/// together by [`build`](CatalogBuilder::build).
#[derive(Debug, Clone, Default)]
pub struct CatalogBuilder {
    migrations: BTreeMap<MigrationId, Migration>,
    errors: Vec<CatalogError>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a migration, recording any failure for later
    pub fn add(&mut self, migration: Migration) -> &mut Self {
        if self.migrations.contains_key(&migration.id) {
            self.errors
                .push(CatalogError::DuplicateId { id: migration.id });
            return self;
        }
        if let Err(err) = migration.validate() {
            self.errors.push(err);
            return self;
        }
        self.migrations.insert(migration.id, migration);
        self
    }

    /// Chaining form of [`add`](CatalogBuilder::add)
    pub fn register(mut self, migration: Migration) -> Self {
        self.add(migration);
        self
    }

    /// Failures recorded so far
    pub fn errors(&self) -> &[CatalogError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Report every registration failure without consuming the builder
    ///
    /// # Errors
    ///
    /// Returns an aggregate error whose kind is that of the first failure
    /// and whose `causes` hold one error per failed registration.
    pub fn check(&self) -> Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let causes: Vec<MigrateError> = self.errors.iter().cloned().map(Into::into).collect();
        let kind = causes[0].kind();
        Err(MigrateError::new(kind)
            .with_op("build_catalog")
            .with_message(format!(
                "{} migration registration error(s)",
                causes.len()
            ))
            .with_causes(causes))
    }

    /// Produce the catalog, or every registration failure at once
    ///
    /// # Errors
    ///
    /// See [`check`](CatalogBuilder::check).
    pub fn build(self) -> Result<Catalog> {
        self.check()?;
        Ok(Catalog {
            migrations: self.migrations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::model::Action;

    fn migration(id: MigrationId) -> Migration {
        Migration::new(
            id,
            format!("m{}", id),
            Action::sql("SELECT 1"),
            Action::sql("SELECT 1"),
        )
    }

    #[test]
    fn test_build_keeps_ascending_order() {
        let catalog = CatalogBuilder::new()
            .register(migration(3))
            .register(migration(1))
            .register(migration(2))
            .build()
            .unwrap();

        assert_eq!(catalog.ids().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_first_registration_wins_on_duplicate() {
        let mut builder = CatalogBuilder::new();
        builder.add(migration(5));
        builder.add(Migration::new(
            5,
            "other",
            Action::sql("SELECT 2"),
            Action::sql("SELECT 2"),
        ));

        assert_eq!(builder.len(), 1);
        assert_eq!(builder.errors(), &[CatalogError::DuplicateId { id: 5 }]);
    }

    #[test]
    fn test_insert_after_build_rejects_existing_id() {
        let mut catalog = CatalogBuilder::new()
            .register(migration(1))
            .build()
            .unwrap();

        let err = catalog.insert(migration(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        catalog.insert(migration(2)).unwrap();
        assert_eq!(catalog.len(), 2);
    }
}

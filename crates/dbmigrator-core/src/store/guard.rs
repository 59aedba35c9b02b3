use crate::errors::{internal, Result};
use crate::store::LogTransaction;

/// Scoped ownership of an open transaction
///
/// The transaction is rolled back when the guard is dropped without an
/// explicit [`commit`](TransactionGuard::commit), so every early return
/// through `?` leaves the store untouched.
pub struct TransactionGuard {
    tx: Option<Box<dyn LogTransaction>>,
    op: &'static str,
}

impl TransactionGuard {
    pub fn new(tx: Box<dyn LogTransaction>, op: &'static str) -> Self {
        Self { tx: Some(tx), op }
    }

    /// Borrow the open transaction
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the transaction was already finished.
    pub fn tx(&mut self) -> Result<&mut dyn LogTransaction> {
        match self.tx.as_deref_mut() {
            Some(tx) => Ok(tx),
            None => Err(internal(self.op, "transaction already finished")),
        }
    }

    /// # Errors
    ///
    /// Returns the store's commit error; the transaction is gone either way.
    pub fn commit(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.commit(),
            None => Err(internal(self.op, "transaction already finished")),
        }
    }

    /// # Errors
    ///
    /// Returns the store's rollback error.
    pub fn rollback(mut self) -> Result<()> {
        match self.tx.take() {
            Some(tx) => tx.rollback(),
            None => Ok(()),
        }
    }
}

impl Drop for TransactionGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            if let Err(err) = tx.rollback() {
                tracing::warn!(op = self.op, error = %err, "rollback on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogEntry, LogStatus};
    use crate::store::{InMemoryLogStore, LogStore};

    #[test]
    fn test_drop_rolls_back() {
        let store = InMemoryLogStore::new();
        {
            let mut guard = TransactionGuard::new(store.begin_transaction().unwrap(), "test");
            guard
                .tx()
                .unwrap()
                .batch_insert(&[LogEntry::new(1, LogStatus::Applied, "a")])
                .unwrap();
        }
        assert!(store.rows().is_empty());
    }

    #[test]
    fn test_commit_persists() {
        let store = InMemoryLogStore::new();
        let mut guard = TransactionGuard::new(store.begin_transaction().unwrap(), "test");
        guard
            .tx()
            .unwrap()
            .batch_insert(&[LogEntry::new(1, LogStatus::Applied, "a")])
            .unwrap();
        guard.commit().unwrap();

        assert_eq!(store.rows().len(), 1);
    }
}

//! Transaction helper
//!
//! Runs a unit of work inside one database transaction: commit when the work
//! succeeds, roll back when it fails. If the rollback fails as well, both
//! errors are reported together.

use futures::future::BoxFuture;
use sea_orm::{
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, IsolationLevel,
    TransactionTrait,
};
use tracing::warn;

use crate::error::{Result, StorageError};

/// Executes closures inside a transaction on a shared pool
#[derive(Clone, Debug)]
pub struct TransactionRunner {
    db: DatabaseConnection,
    isolation: IsolationLevel,
}

impl TransactionRunner {
    pub fn new(db: DatabaseConnection, isolation: IsolationLevel) -> Self {
        Self { db, isolation }
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    /// Run `work` in a fresh transaction.
    ///
    /// Dropping the returned future before it completes drops the open
    /// transaction, which rolls it back.
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c DatabaseTransaction) -> BoxFuture<'c, Result<T>> + Send,
        T: Send,
    {
        // SQLite transactions are always serializable and reject the SET statement.
        let isolation = match self.db.get_database_backend() {
            DbBackend::Sqlite => None,
            _ => Some(self.isolation),
        };

        let txn = self
            .db
            .begin_with_config(isolation, None)
            .await
            .map_err(StorageError::Begin)?;

        match work(&txn).await {
            Ok(value) => {
                txn.commit().await.map_err(StorageError::Commit)?;
                Ok(value)
            }
            Err(err) => rollback(txn, err).await,
        }
    }
}

/// Roll back `txn`, keeping the original error and any rollback error.
async fn rollback<T>(txn: DatabaseTransaction, err: StorageError) -> Result<T> {
    match txn.rollback().await {
        Ok(()) => Err(err),
        Err(source) => {
            warn!(error = %err, rollback_error = %source, "Transaction rollback failed");
            Err(StorageError::Rollback {
                original: Box::new(err),
                source,
            })
        }
    }
}

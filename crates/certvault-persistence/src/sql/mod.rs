//! SQL-based certificate store (CockroachDB/PostgreSQL/SQLite via SeaORM)
//!
//! [`SqlStorage`] owns one connection pool and hands clones of it to the
//! [`LockCoordinator`] and the [`ValueStore`]. It holds no other mutable
//! state, so any number of tasks, processes or machines can share one
//! database through it.

mod lock;
mod transaction;
mod value;

pub use lock::LockCoordinator;
pub use transaction::TransactionRunner;
pub use value::ValueStore;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend};
use tracing::{info, warn};

use crate::error::{Result, StorageError};
use crate::model::{KeyInfo, ListRequest};
use crate::options::StorageOptions;
use crate::schema;
use crate::traits::CertificateStorage;

/// Certificate storage backed by a SQL database
#[derive(Clone, Debug)]
pub struct SqlStorage {
    db: DatabaseConnection,
    locks: LockCoordinator,
    values: ValueStore,
    query_timeout: Duration,
}

impl SqlStorage {
    /// Open a pool for `options` and verify it answers.
    ///
    /// Failure to open or ping is a [`StorageError::Connection`].
    pub async fn connect(options: StorageOptions) -> Result<Self> {
        let target = options.redacted_url();

        if options.has_partial_tls() {
            warn!(
                target = %target,
                "Incomplete TLS configuration: sslcert, sslkey and sslrootcert are all required, connecting without TLS"
            );
        }
        if options.is_insecure() {
            warn!(
                target = %target,
                "Connecting without TLS. This is only acceptable for local development"
            );
        }

        info!(
            target = %target,
            max_connections = options.pool.max_connections,
            min_connections = options.pool.min_connections,
            lock_timeout = ?options.lock_timeout,
            query_timeout = ?options.query_timeout,
            "Connecting certificate store"
        );

        let db = Database::connect(options.connect_options())
            .await
            .map_err(|source| StorageError::Connection {
                target: target.clone(),
                source,
            })?;

        db.ping()
            .await
            .map_err(|source| StorageError::Connection { target, source })?;

        Ok(Self::from_connection(db, &options))
    }

    /// Wrap an already opened pool.
    pub fn from_connection(db: DatabaseConnection, options: &StorageOptions) -> Self {
        let runner = TransactionRunner::new(db.clone(), options.isolation);
        Self {
            locks: LockCoordinator::new(
                db.clone(),
                runner,
                options.lock_timeout,
                options.query_timeout,
            ),
            values: ValueStore::new(db.clone(), options.query_timeout),
            query_timeout: options.query_timeout,
            db,
        }
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn backend(&self) -> DbBackend {
        self.db.get_database_backend()
    }

    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// A copy of this store whose operations are bounded by `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            db: self.db.clone(),
            locks: self.locks.with_timeout(timeout),
            values: self.values.with_timeout(timeout),
            query_timeout: timeout,
        }
    }

    /// Ping the pool.
    pub async fn health_check(&self) -> Result<()> {
        with_deadline("health check", self.query_timeout, async {
            self.db
                .ping()
                .await
                .map_err(|source| StorageError::Connection {
                    target: format!("{:?}", self.backend()),
                    source,
                })
        })
        .await
    }

    /// Create the `locks` and `values` tables if they are missing.
    pub async fn provision_schema(&self) -> Result<()> {
        schema::create_tables(&self.db).await
    }

    /// Run an operator-provided SQL script against the pool.
    pub async fn execute_sql_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        schema::execute_sql_file(&self.db, path).await
    }
}

#[async_trait]
impl CertificateStorage for SqlStorage {
    async fn lock(&self, key: &str) -> Result<()> {
        self.locks.acquire(key).await
    }

    async fn unlock(&self, key: &str) -> Result<()> {
        self.locks.release(key).await
    }

    async fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        self.values.store(key, value).await
    }

    async fn load(&self, key: &str) -> Result<Vec<u8>> {
        self.values.load(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.delete(key).await
    }

    async fn exists(&self, key: &str) -> bool {
        self.values.exists(key).await
    }

    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<String>> {
        self.values
            .list_by_prefix(&ListRequest::new(prefix, recursive))
            .await
    }

    async fn stat(&self, key: &str) -> Result<KeyInfo> {
        self.values.stat(key).await
    }
}

/// Reject keys the store cannot address.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey("key must not be empty".to_string()));
    }
    Ok(())
}

/// Bound `future` by `timeout`, reporting expiry as [`StorageError::Timeout`].
pub(crate) async fn with_deadline<T, F>(
    operation: &'static str,
    timeout: Duration,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout { operation, timeout }),
    }
}

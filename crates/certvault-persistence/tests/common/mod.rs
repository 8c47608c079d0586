//! Storage test utilities
//!
//! SQLite tests run everywhere. Tests against PostgreSQL or CockroachDB read
//! `TEST_DATABASE_URL` and are ignored by default.

#![allow(dead_code)]

use std::env;
use std::time::Duration;

use certvault_persistence::sea_orm::{ConnectionTrait, IsolationLevel};
use certvault_persistence::{PoolOptions, SqlStorage, StorageOptions};

/// In-memory SQLite storage with the schema provisioned.
pub async fn sqlite_storage(lock_timeout: Duration) -> SqlStorage {
    let options = StorageOptions::from_url("sqlite::memory:")
        .with_lock_timeout(lock_timeout)
        .with_pool(PoolOptions {
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        });
    let storage = SqlStorage::connect(options)
        .await
        .expect("SQLite connection failed");
    storage
        .provision_schema()
        .await
        .expect("Schema provisioning failed");
    storage
}

/// Storage against `TEST_DATABASE_URL` with both tables emptied.
pub async fn database_storage(lock_timeout: Duration) -> Option<SqlStorage> {
    database_storage_with_isolation(lock_timeout, IsolationLevel::Serializable).await
}

/// Like [`database_storage`], acquiring locks at `isolation`.
pub async fn database_storage_with_isolation(
    lock_timeout: Duration,
    isolation: IsolationLevel,
) -> Option<SqlStorage> {
    let url = env::var("TEST_DATABASE_URL").ok()?;
    let options = StorageOptions::from_url(&url)
        .with_lock_timeout(lock_timeout)
        .with_isolation(isolation);
    let storage = SqlStorage::connect(options)
        .await
        .expect("Database connection failed");
    storage
        .provision_schema()
        .await
        .expect("Schema provisioning failed");
    for table in ["\"locks\"", "\"values\""] {
        storage
            .db()
            .execute_unprepared(&format!("DELETE FROM {}", table))
            .await
            .expect("Table cleanup failed");
    }
    Some(storage)
}

//! Advisory locks on top of the `locks` table
//!
//! Acquiring a lock is a check-then-upsert inside one transaction:
//!
//! 1. read the database clock and the lock row for the key,
//! 2. fail with [`StorageError::LockHeld`] if it expires in the future,
//! 3. otherwise write `expires = now + ttl`, replacing the row only if it has
//!    expired by then.
//!
//! The write in step 3 is conditional, so a concurrent acquirer that slipped
//! in between the read and the write is never overwritten, whatever the
//! isolation level. Under snapshot isolation the loser may instead see a
//! serialization failure, reported as [`StorageError::Conflict`] for the
//! caller to retry.
//!
//! Nothing sweeps expired rows. Release deletes the row without checking who
//! created it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Alias, Expr, OnConflict, Query};
use sea_orm::{
    ActiveValue::Set, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait,
};
use tracing::debug;

use super::{TransactionRunner, validate_key, with_deadline};
use crate::entity::locks;
use crate::error::{Result, StorageError, is_conflict};

#[derive(Clone, Debug)]
pub struct LockCoordinator {
    db: DatabaseConnection,
    runner: TransactionRunner,
    lock_timeout: Duration,
    query_timeout: Duration,
}

impl LockCoordinator {
    pub fn new(
        db: DatabaseConnection,
        runner: TransactionRunner,
        lock_timeout: Duration,
        query_timeout: Duration,
    ) -> Self {
        Self {
            db,
            runner,
            lock_timeout,
            query_timeout,
        }
    }

    /// A copy whose operations are bounded by `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            query_timeout: timeout,
            ..self.clone()
        }
    }

    /// How long a lock taken with [`LockCoordinator::acquire`] lives
    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Acquire `key` for the configured lock timeout.
    pub async fn acquire(&self, key: &str) -> Result<()> {
        self.acquire_for(key, self.lock_timeout).await
    }

    /// Acquire `key` for `ttl`.
    pub async fn acquire_for(&self, key: &str, ttl: Duration) -> Result<()> {
        validate_key(key)?;
        if ttl.is_zero() {
            return Err(StorageError::InvalidTimeout(ttl));
        }
        let lifetime = chrono::Duration::from_std(ttl).map_err(|_| StorageError::InvalidTimeout(ttl))?;

        let owned = key.to_string();
        let attempt = self.runner.run(move |txn| {
            Box::pin(async move {
                let now = database_now(txn).await.map_err(|e| {
                    StorageError::from_lock_error(&owned, "could not read database clock", e)
                })?;

                let existing = locks::Entity::find_by_id(owned.as_str())
                    .one(txn)
                    .await
                    .map_err(|e| {
                        StorageError::from_lock_error(
                            &owned,
                            format!("could not check lock for key {}", owned),
                            e,
                        )
                    })?;

                if let Some(lock) = existing
                    && lock.is_held_at(now)
                {
                    return Err(StorageError::LockHeld(owned));
                }

                let expires = now
                    .checked_add_signed(lifetime)
                    .ok_or(StorageError::InvalidTimeout(ttl))?;

                let written = write_lock(txn, &owned, now, expires).await.map_err(|e| {
                    StorageError::from_lock_error(
                        &owned,
                        format!("could not acquire lock for key {}", owned),
                        e,
                    )
                })?;
                if !written {
                    return Err(StorageError::LockHeld(owned));
                }

                Ok(expires)
            })
        });

        match with_deadline("acquire lock", self.query_timeout, attempt).await {
            Ok(expires) => {
                debug!(key, expires = %expires, "Lock acquired");
                Ok(())
            }
            // Serializable engines often report the lost race only at commit.
            Err(StorageError::Commit(source)) if is_conflict(&source) => {
                debug!(key, "Lock acquisition conflicted at commit");
                Err(StorageError::Conflict {
                    key: key.to_string(),
                    source,
                })
            }
            Err(err) => {
                debug!(key, error = %err, "Lock not acquired");
                Err(err)
            }
        }
    }

    /// Delete the lock row for `key`. Releasing a key that is not locked is not an error.
    pub async fn release(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let result = with_deadline("release lock", self.query_timeout, async {
            locks::Entity::delete_by_id(key)
                .exec(&self.db)
                .await
                .map_err(|e| StorageError::store(format!("could not release lock for key {}", key), e))
        })
        .await?;

        debug!(key, released = result.rows_affected > 0, "Lock released");
        Ok(())
    }

    /// Expiry of the lock currently held on `key`, if any.
    pub async fn lock_expiry(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        validate_key(key)?;

        let lock = with_deadline("read lock", self.query_timeout, async {
            locks::Entity::find_by_id(key)
                .one(&self.db)
                .await
                .map_err(|e| StorageError::store(format!("could not check lock for key {}", key), e))
        })
        .await?;

        let now = with_deadline("read lock", self.query_timeout, async {
            database_now(&self.db)
                .await
                .map_err(|e| StorageError::store("could not read database clock", e))
        })
        .await?;
        Ok(lock.filter(|l| l.is_held_at(now)).map(|l| l.expires))
    }
}

/// Current time according to the backing engine.
///
/// Postgres-wire engines answer `CURRENT_TIMESTAMP`, the transaction start
/// time, so every host compares expiries against one clock. SQLite is a
/// local file and shares the host clock.
async fn database_now<C: ConnectionTrait>(
    conn: &C,
) -> std::result::Result<DateTime<Utc>, DbErr> {
    let backend = conn.get_database_backend();
    if backend == DbBackend::Sqlite {
        return Ok(Utc::now());
    }

    let query = Query::select()
        .expr_as(Expr::current_timestamp(), Alias::new("now"))
        .to_owned();
    let row = conn
        .query_one(backend.build(&query))
        .await?
        .ok_or_else(|| DbErr::RecordNotFound("CURRENT_TIMESTAMP returned no row".to_string()))?;
    row.try_get("", "now")
}

/// Insert the lock row for `key`, or take over a row that has expired at `now`.
///
/// Returns `false` and writes nothing when the existing row is still live.
async fn write_lock<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    now: DateTime<Utc>,
    expires: DateTime<Utc>,
) -> std::result::Result<bool, DbErr> {
    let record = locks::ActiveModel {
        key: Set(key.to_string()),
        expires: Set(expires),
    };
    let rows = locks::Entity::insert(record)
        .on_conflict(
            OnConflict::column(locks::Column::Key)
                .update_column(locks::Column::Expires)
                .action_and_where(Expr::col((locks::Entity, locks::Column::Expires)).lte(now))
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(rows > 0)
}

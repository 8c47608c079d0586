//! Error types for the certificate store
//!
//! Every public operation returns a [`StorageError`] the caller can branch on.
//! Nothing in this crate retries: lock contention, transaction conflicts and
//! timeouts are reported and the calling workflow decides how to back off.

use std::time::Duration;

use sea_orm::{DbErr, RuntimeErr, SqlErr};

/// Result alias used throughout the persistence crate
pub type Result<T, E = StorageError> = std::result::Result<T, E>;

/// SQLSTATE codes that mean "the transaction lost a race, run it again".
///
/// `40001` covers PostgreSQL serialization failures and CockroachDB restarts,
/// `40P01` is a detected deadlock.
const RETRYABLE_SQLSTATES: &[&str] = &["40001", "40P01"];

/// SQLite result codes for a locked database (`SQLITE_BUSY`, `SQLITE_BUSY_SNAPSHOT`).
const SQLITE_BUSY_CODES: &[&str] = &["5", "517"];

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    /// The backing store could not be reached or did not answer a ping.
    #[error("could not connect to {target}: {source}")]
    Connection {
        target: String,
        #[source]
        source: DbErr,
    },

    /// An unexpired lock already exists for the key.
    #[error("a lock exists for key {0}")]
    LockHeld(String),

    /// A concurrent transaction touched the same lock row.
    #[error("lock acquisition for key {key} conflicted with a concurrent transaction: {source}")]
    Conflict {
        key: String,
        #[source]
        source: DbErr,
    },

    #[error("key {0} does not exist")]
    NotFound(String),

    /// Any other backing store failure, with the statement it came from.
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: DbErr,
    },

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid lock timeout {0:?}: must be positive")]
    InvalidTimeout(Duration),

    #[error("could not begin transaction: {0}")]
    Begin(#[source] DbErr),

    #[error("could not commit transaction: {0}")]
    Commit(#[source] DbErr),

    /// Rolling back after a failed unit of work failed as well. Both causes are kept.
    #[error("could not rollback transaction after error ({original}): {source}")]
    Rollback {
        original: Box<StorageError>,
        #[source]
        source: DbErr,
    },
}

impl StorageError {
    /// Wrap a driver error with the operation it came from.
    pub fn store(context: impl Into<String>, source: DbErr) -> Self {
        StorageError::Store {
            context: context.into(),
            source,
        }
    }

    /// Classify a driver error raised while acquiring the lock for `key`.
    ///
    /// Serialization failures, deadlocks, busy SQLite files and duplicate
    /// lock rows become [`StorageError::Conflict`]; everything else is a
    /// plain [`StorageError::Store`].
    pub fn from_lock_error(key: &str, context: impl Into<String>, source: DbErr) -> Self {
        if is_conflict(&source) {
            StorageError::Conflict {
                key: key.to_string(),
                source,
            }
        } else {
            StorageError::store(context, source)
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }

    /// Whether the caller can reasonably back off and try the same call again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::LockHeld(_) | StorageError::Conflict { .. } | StorageError::Timeout { .. }
        )
    }
}

/// Returns true when the engine reports a transaction conflict.
pub fn is_conflict(err: &DbErr) -> bool {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        return true;
    }

    let runtime = match err {
        DbErr::Conn(e) | DbErr::Exec(e) | DbErr::Query(e) => e,
        _ => return false,
    };

    match runtime {
        RuntimeErr::SqlxError(sea_orm::sqlx::Error::Database(db_err)) => match db_err.code() {
            Some(code) => {
                RETRYABLE_SQLSTATES.contains(&code.as_ref())
                    || SQLITE_BUSY_CODES.contains(&code.as_ref())
            }
            None => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use sea_orm::sqlx::error::{DatabaseError, ErrorKind};
    use sea_orm::{ActiveValue::Set, EntityTrait};

    use super::*;
    use crate::entity::locks;
    use crate::sql::tests::memory_db;

    /// Driver error carrying only a SQLSTATE, as the Postgres wire reports it.
    #[derive(Debug)]
    struct SqlState(&'static str);

    impl std::fmt::Display for SqlState {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "database error {}", self.0)
        }
    }

    impl std::error::Error for SqlState {}

    impl DatabaseError for SqlState {
        fn message(&self) -> &str {
            "could not serialize access due to concurrent update"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn driver_error(code: &'static str) -> DbErr {
        DbErr::Exec(RuntimeErr::SqlxError(sea_orm::sqlx::Error::Database(
            Box::new(SqlState(code)),
        )))
    }

    #[test]
    fn test_sqlstate_conflicts() {
        assert!(is_conflict(&driver_error("40001")));
        assert!(is_conflict(&driver_error("40P01")));
        assert!(is_conflict(&driver_error("5")));
        assert!(is_conflict(&driver_error("517")));
        assert!(!is_conflict(&driver_error("42P01")));

        let err = StorageError::from_lock_error(
            "cert/a",
            "could not acquire lock",
            driver_error("40001"),
        );
        assert!(matches!(err, StorageError::Conflict { ref key, .. } if key == "cert/a"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_duplicate_lock_row_is_conflict() {
        let db = memory_db().await;
        let row = || locks::ActiveModel {
            key: Set("cert/a".to_string()),
            expires: Set(chrono::Utc::now()),
        };

        locks::Entity::insert(row())
            .exec_without_returning(&db)
            .await
            .unwrap();
        let source = locks::Entity::insert(row())
            .exec_without_returning(&db)
            .await
            .unwrap_err();

        assert!(is_conflict(&source));
        let err = StorageError::from_lock_error("cert/a", "could not acquire lock", source);
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(StorageError::LockHeld("a".to_string()).is_retryable());
        assert!(
            StorageError::Timeout {
                operation: "load",
                timeout: Duration::from_secs(3),
            }
            .is_retryable()
        );
        assert!(!StorageError::NotFound("a".to_string()).is_retryable());
        assert!(!StorageError::Unsupported("recursive listing").is_retryable());
    }

    #[test]
    fn test_not_found() {
        assert!(StorageError::NotFound("cert/a".to_string()).is_not_found());
        assert!(!StorageError::LockHeld("cert/a".to_string()).is_not_found());
    }

    #[test]
    fn test_plain_errors_are_not_conflicts() {
        assert!(!is_conflict(&DbErr::Custom("boom".to_string())));
        assert!(!is_conflict(&DbErr::RecordNotFound("x".to_string())));

        let err = StorageError::from_lock_error(
            "cert/a",
            "could not check lock",
            DbErr::Custom("boom".to_string()),
        );
        assert!(matches!(err, StorageError::Store { .. }));
    }

    #[test]
    fn test_rollback_message_keeps_both_causes() {
        let err = StorageError::Rollback {
            original: Box::new(StorageError::LockHeld("cert/a".to_string())),
            source: DbErr::Custom("connection reset".to_string()),
        };
        let message = err.to_string();
        assert!(message.contains("a lock exists for key cert/a"));
        assert!(message.contains("connection reset"));
    }

    #[test]
    fn test_lock_held_message() {
        assert_eq!(
            StorageError::LockHeld("cert/a".to_string()).to_string(),
            "a lock exists for key cert/a"
        );
    }
}

//! Opaque values on top of the `values` table
//!
//! Every operation is a single statement, so the engine's per-statement
//! atomicity is enough and no transaction is opened.
//!
//! Absent keys: `load`, `delete` and `stat` fail with
//! [`StorageError::NotFound`]. An empty payload that was stored is returned as
//! an empty vector.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Alias, Expr, Func, LikeExpr, OnConflict, SimpleExpr};
use sea_orm::{
    ActiveValue::Set, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use tracing::{debug, warn};

use super::{validate_key, with_deadline};
use crate::entity::values;
use crate::error::{Result, StorageError};
use crate::model::{KeyInfo, ListMode, ListRequest};

/// Escape character used in LIKE patterns built from user prefixes
const LIKE_ESCAPE: char = '\\';

#[derive(Clone, Debug)]
pub struct ValueStore {
    db: DatabaseConnection,
    query_timeout: Duration,
}

impl ValueStore {
    pub fn new(db: DatabaseConnection, query_timeout: Duration) -> Self {
        Self { db, query_timeout }
    }

    /// A copy whose operations are bounded by `timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            db: self.db.clone(),
            query_timeout: timeout,
        }
    }

    /// Insert or overwrite the value at `key` and refresh its timestamp.
    pub async fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;

        let record = values::ActiveModel {
            key: Set(key.to_string()),
            value: Set(Some(value.to_vec())),
            updated: Set(Utc::now()),
        };

        with_deadline("store", self.query_timeout, async {
            values::Entity::insert(record)
                .on_conflict(
                    OnConflict::column(values::Column::Key)
                        .update_columns([values::Column::Value, values::Column::Updated])
                        .to_owned(),
                )
                .exec_without_returning(&self.db)
                .await
                .map_err(|e| StorageError::store(format!("could not store value for key {}", key), e))
        })
        .await?;

        debug!(key, size = value.len(), "Value stored");
        Ok(())
    }

    pub async fn load(&self, key: &str) -> Result<Vec<u8>> {
        validate_key(key)?;

        let row = with_deadline("load", self.query_timeout, async {
            values::Entity::find_by_id(key)
                .select_only()
                .column(values::Column::Value)
                .into_tuple::<Option<Vec<u8>>>()
                .one(&self.db)
                .await
                .map_err(|e| StorageError::store(format!("could not load value for key {}", key), e))
        })
        .await?;

        match row {
            Some(value) => Ok(value.unwrap_or_default()),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;

        let result = with_deadline("delete", self.query_timeout, async {
            values::Entity::delete_by_id(key)
                .exec(&self.db)
                .await
                .map_err(|e| StorageError::store(format!("could not delete value for key {}", key), e))
        })
        .await?;

        if result.rows_affected == 0 {
            return Err(StorageError::NotFound(key.to_string()));
        }
        debug!(key, "Value deleted");
        Ok(())
    }

    /// Whether a value is stored at `key`.
    ///
    /// Never fails: a backend error or timeout is logged and reported as `false`.
    pub async fn exists(&self, key: &str) -> bool {
        if validate_key(key).is_err() {
            return false;
        }

        let count = with_deadline("exists", self.query_timeout, async {
            values::Entity::find_by_id(key)
                .count(&self.db)
                .await
                .map_err(|e| StorageError::store(format!("could not check key {}", key), e))
        })
        .await;

        match count {
            Ok(count) => count > 0,
            Err(err) => {
                warn!(key, error = %err, "Exists check failed, reporting key as absent");
                false
            }
        }
    }

    /// Size and modification time of the value at `key`, without its payload.
    pub async fn stat(&self, key: &str) -> Result<KeyInfo> {
        validate_key(key)?;

        let size: SimpleExpr = Func::cust(Alias::new("LENGTH"))
            .arg(Expr::col(values::Column::Value))
            .into();

        let row = with_deadline("stat", self.query_timeout, async {
            values::Entity::find_by_id(key)
                .select_only()
                .column_as(size.cast_as(Alias::new("BIGINT")), "size")
                .column(values::Column::Updated)
                .into_tuple::<(Option<i64>, DateTime<Utc>)>()
                .one(&self.db)
                .await
                .map_err(|e| StorageError::store(format!("could not stat key {}", key), e))
        })
        .await?;

        let Some((size, modified)) = row else {
            return Err(StorageError::NotFound(key.to_string()));
        };

        Ok(KeyInfo {
            key: key.to_string(),
            size: size.unwrap_or_default(),
            modified,
            is_terminal: true,
        })
    }

    /// Keys starting with the request prefix, in byte order.
    ///
    /// Recursive listing has no meaning for a flat keyspace and is refused.
    pub async fn list_by_prefix(&self, request: &ListRequest) -> Result<Vec<String>> {
        if request.mode == ListMode::Recursive {
            return Err(StorageError::Unsupported(
                "recursive listing is not supported by a flat keyspace",
            ));
        }

        let prefix = request.prefix.as_str();
        let pattern = LikeExpr::new(format!("{}%", escape_like(prefix))).escape(LIKE_ESCAPE);

        let mut keys = with_deadline("list", self.query_timeout, async {
            values::Entity::find()
                .select_only()
                .column(values::Column::Key)
                .filter(Expr::col(values::Column::Key).like(pattern))
                .order_by_asc(values::Column::Key)
                .into_tuple::<String>()
                .all(&self.db)
                .await
                .map_err(|e| StorageError::store(format!("could not list keys with prefix {}", prefix), e))
        })
        .await?;

        // LIKE ignores ASCII case on SQLite and collations may not sort bytewise.
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();

        debug!(prefix, count = keys.len(), "Keys listed");
        Ok(keys)
    }
}

/// Escape LIKE wildcards so the prefix only matches literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if c == LIKE_ESCAPE || c == '%' || c == '_' {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

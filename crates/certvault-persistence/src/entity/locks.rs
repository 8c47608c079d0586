//! `SeaORM` Entity for the locks table
//!
//! One row per locked key. Rows whose `expires` is in the past are stale and
//! get overwritten by the next acquire for the same key.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "locks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub key: String,
    pub expires: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// A lock only counts while its expiry is strictly in the future.
    pub fn is_held_at(&self, now: DateTimeUtc) -> bool {
        self.expires > now
    }
}

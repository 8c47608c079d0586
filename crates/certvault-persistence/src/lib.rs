//! Certvault Persistence - SQL certificate storage with advisory locking
//!
//! This crate provides:
//! - SeaORM entity definitions for the `locks` and `values` tables
//! - A lock coordinator built from transactional check-then-upsert
//! - A value store for opaque certificate blobs
//! - The `CertificateStorage` trait and its SQL implementation

pub mod entity;
pub mod error;
pub mod model;
pub mod options;
pub mod schema;
pub mod sql;
pub mod traits;

// Re-export sea-orm for convenience
pub use sea_orm;

pub use entity::prelude::*;

pub use error::{Result, StorageError};

pub use model::{KeyInfo, ListMode, ListRequest};

pub use options::{
    DEFAULT_LOCK_TIMEOUT, DEFAULT_PORT, DEFAULT_QUERY_TIMEOUT, PoolOptions, StorageOptions,
    parse_isolation_level,
};

pub use sql::{LockCoordinator, SqlStorage, TransactionRunner, ValueStore};

pub use traits::CertificateStorage;

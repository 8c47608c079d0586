//! Storage contract consumed by the certificate management workflow
//!
//! The workflow locks a key, reads and writes values under it, then unlocks.
//! Implementations must keep the semantics of [`crate::SqlStorage`]: absent
//! keys are [`crate::StorageError::NotFound`] for load, delete and stat,
//! `exists` never fails and recursive listing is refused.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::KeyInfo;

#[async_trait]
pub trait CertificateStorage: Send + Sync {
    /// Take the advisory lock on `key` for the configured lock timeout
    async fn lock(&self, key: &str) -> Result<()>;

    /// Drop the lock on `key`, whoever holds it
    async fn unlock(&self, key: &str) -> Result<()>;

    async fn store(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn load(&self, key: &str) -> Result<Vec<u8>>;

    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> bool;

    /// Keys starting with `prefix`, sorted
    async fn list(&self, prefix: &str, recursive: bool) -> Result<Vec<String>>;

    async fn stat(&self, key: &str) -> Result<KeyInfo>;
}

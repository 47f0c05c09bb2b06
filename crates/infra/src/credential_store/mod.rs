//! Durable per-user credential records.
//!
//! The store is a plain keyed-blob repository: it has no knowledge of the
//! token blob's internal structure. It is written only by the token cache's
//! after-access hook; every other component is a reader.

mod in_memory;
#[cfg(feature = "redis")]
mod redis;

pub use in_memory::InMemoryCredentialStore;
#[cfg(feature = "redis")]
pub use redis::RedisCredentialStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use cloudgate_core::UserKey;

/// Logical table name (used as the Redis key prefix).
pub const TOKEN_CACHE_TABLE: &str = "tokencache";

/// One user's persisted token-cache blob.
///
/// At most one live record per `user_key`; `last_write_time` strictly
/// increases across persisted writes for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCredentialRecord {
    pub user_key: UserKey,
    pub blob: Vec<u8>,
    pub last_write_time: DateTime<Utc>,
}

/// Credential store operation error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Transient backend fault; safe to retry the whole before/after cycle.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A conditional write lost: the record changed since it was read.
    /// Resolved by retrying the before/after cycle once.
    #[error("conditional write lost: record changed since read")]
    Conflict,

    /// The blob could not be encoded/decoded (token-cache layer).
    #[error("cache blob codec error: {0}")]
    Codec(String),
}

/// Optimistic-concurrency condition for [`CredentialStore::upsert`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteCondition {
    /// Last write wins.
    None,

    /// Write only if the stored record still carries this `last_write_time`;
    /// otherwise fail with [`StoreError::Conflict`].
    LastWriteAt(DateTime<Utc>),
}

/// Durable key-value store for credential records.
///
/// Backends must treat one `upsert` as atomic per record: concurrent readers
/// observe either the old record or the new one, never a torn blob.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Idempotent create-if-absent of the backing collection plus a
    /// connectivity check.
    async fn provision(&self) -> Result<(), StoreError>;

    /// All records for a user. Zero or one in practice; modeled as a
    /// sequence because the store is keyed loosely.
    async fn get_all(&self, user: &UserKey) -> Result<Vec<CachedCredentialRecord>, StoreError>;

    async fn upsert(
        &self,
        record: &CachedCredentialRecord,
        condition: WriteCondition,
    ) -> Result<(), StoreError>;

    async fn delete(&self, record: &CachedCredentialRecord) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> CredentialStore for Arc<S>
where
    S: CredentialStore + ?Sized,
{
    async fn provision(&self) -> Result<(), StoreError> {
        (**self).provision().await
    }

    async fn get_all(&self, user: &UserKey) -> Result<Vec<CachedCredentialRecord>, StoreError> {
        (**self).get_all(user).await
    }

    async fn upsert(
        &self,
        record: &CachedCredentialRecord,
        condition: WriteCondition,
    ) -> Result<(), StoreError> {
        (**self).upsert(record, condition).await
    }

    async fn delete(&self, record: &CachedCredentialRecord) -> Result<(), StoreError> {
        (**self).delete(record).await
    }
}

//! Connected-subscription records (plain CRUD collaborator).

mod in_memory;
#[cfg(feature = "redis")]
mod redis;

pub use in_memory::InMemorySubscriptionStore;
#[cfg(feature = "redis")]
pub use redis::RedisSubscriptionStore;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cloudgate_core::{DirectoryId, SubscriptionId, UserKey};

use crate::credential_store::StoreError;

/// Logical table name (used as the Redis key prefix).
pub const SUBSCRIPTIONS_TABLE: &str = "azuresubscriptions";

/// A subscription a user has connected to the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub id: SubscriptionId,
    pub directory_id: DirectoryId,
    pub connected_by: UserKey,
    pub connected_on: DateTime<Utc>,
}

/// Keyed storage for subscription records: partition `connected_by`,
/// row `id`.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn provision(&self) -> Result<(), StoreError>;

    async fn list_for_user(&self, user: &UserKey) -> Result<Vec<SubscriptionRecord>, StoreError>;

    async fn get(
        &self,
        user: &UserKey,
        id: SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, StoreError>;

    async fn upsert(&self, record: &SubscriptionRecord) -> Result<(), StoreError>;

    async fn remove(&self, user: &UserKey, id: SubscriptionId) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> SubscriptionStore for Arc<S>
where
    S: SubscriptionStore + ?Sized,
{
    async fn provision(&self) -> Result<(), StoreError> {
        (**self).provision().await
    }

    async fn list_for_user(&self, user: &UserKey) -> Result<Vec<SubscriptionRecord>, StoreError> {
        (**self).list_for_user(user).await
    }

    async fn get(
        &self,
        user: &UserKey,
        id: SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        (**self).get(user, id).await
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> Result<(), StoreError> {
        (**self).upsert(record).await
    }

    async fn remove(&self, user: &UserKey, id: SubscriptionId) -> Result<(), StoreError> {
        (**self).remove(user, id).await
    }
}

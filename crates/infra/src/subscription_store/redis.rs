//! Redis-backed subscription store.
//!
//! One hash per owner (`azuresubscriptions:{user}`), field = subscription id,
//! value = JSON record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use cloudgate_core::{SubscriptionId, UserKey};

use super::{SUBSCRIPTIONS_TABLE, StoreError, SubscriptionRecord, SubscriptionStore};

/// A hung store call must not wedge the calling request.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct RedisSubscriptionStore {
    client: Arc<redis::Client>,
    timeout: Duration,
}

impl RedisSubscriptionStore {
    pub fn new(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
            timeout: DEFAULT_OP_TIMEOUT,
        })
    }

    pub fn from_client(client: Arc<redis::Client>) -> Self {
        Self {
            client,
            timeout: DEFAULT_OP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection_with_timeouts(self.timeout, self.timeout)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    fn partition_key(user: &UserKey) -> String {
        format!("{SUBSCRIPTIONS_TABLE}:{user}")
    }

    fn decode(raw: &str) -> Result<SubscriptionRecord, StoreError> {
        serde_json::from_str(raw).map_err(|e| StoreError::Codec(e.to_string()))
    }
}

#[async_trait]
impl SubscriptionStore for RedisSubscriptionStore {
    async fn provision(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn list_for_user(&self, user: &UserKey) -> Result<Vec<SubscriptionRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: std::collections::HashMap<String, String> = conn
            .hgetall(Self::partition_key(user))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut records = raw
            .values()
            .map(|value| Self::decode(value))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by_key(|r| r.connected_on);
        Ok(records)
    }

    async fn get(
        &self,
        user: &UserKey,
        id: SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .hget(Self::partition_key(user), id.to_string())
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        raw.as_deref().map(Self::decode).transpose()
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let value = serde_json::to_string(record).map_err(|e| StoreError::Codec(e.to_string()))?;
        conn.hset::<_, _, _, ()>(
            Self::partition_key(&record.connected_by),
            record.id.to_string(),
            value,
        )
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn remove(&self, user: &UserKey, id: SubscriptionId) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.hdel::<_, _, ()>(Self::partition_key(user), id.to_string())
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

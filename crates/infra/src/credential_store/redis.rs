//! Redis-backed credential store.
//!
//! One hash per user (`tokencache:{user}` → `{blob, last_write_time}`).
//! Conditional writes are a Lua compare-and-set on `last_write_time`, so the
//! check-and-write is atomic on the server. Redis needs no table creation;
//! `provision` is a connectivity check.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::AsyncCommands;

use cloudgate_core::UserKey;

use super::{
    CachedCredentialRecord, CredentialStore, StoreError, TOKEN_CACHE_TABLE, WriteCondition,
};

/// A hung store call must not wedge the calling request.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(10);

const CAS_UPSERT_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'last_write_time')
if not current or current ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'blob', ARGV[2], 'last_write_time', ARGV[3])
return 1
"#;

#[derive(Debug, Clone)]
pub struct RedisCredentialStore {
    client: Arc<redis::Client>,
    timeout: Duration,
}

impl RedisCredentialStore {
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

    fn record_key(user: &UserKey) -> String {
        format!("{TOKEN_CACHE_TABLE}:{user}")
    }

    fn encode_time(time: DateTime<Utc>) -> String {
        time.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn decode_time(raw: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StoreError::Codec(format!("last_write_time: {e}")))
    }
}

#[async_trait]
impl CredentialStore for RedisCredentialStore {
    async fn provision(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn get_all(&self, user: &UserKey) -> Result<Vec<CachedCredentialRecord>, StoreError> {
        let mut conn = self.connection().await?;
        let (blob, last_write_time): (Option<Vec<u8>>, Option<String>) = conn
            .hget(Self::record_key(user), &["blob", "last_write_time"])
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        match (blob, last_write_time) {
            (Some(blob), Some(raw_time)) => Ok(vec![CachedCredentialRecord {
                user_key: user.clone(),
                blob,
                last_write_time: Self::decode_time(&raw_time)?,
            }]),
            _ => Ok(Vec::new()),
        }
    }

    async fn upsert(
        &self,
        record: &CachedCredentialRecord,
        condition: WriteCondition,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let key = Self::record_key(&record.user_key);
        let stamped = Self::encode_time(record.last_write_time);

        match condition {
            WriteCondition::None => {
                redis::pipe()
                    .atomic()
                    .hset(&key, "blob", record.blob.as_slice())
                    .hset(&key, "last_write_time", &stamped)
                    .query_async::<_, ()>(&mut conn)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;
                Ok(())
            }
            WriteCondition::LastWriteAt(expected) => {
                let updated: i32 = redis::Script::new(CAS_UPSERT_SCRIPT)
                    .key(&key)
                    .arg(Self::encode_time(expected))
                    .arg(record.blob.as_slice())
                    .arg(&stamped)
                    .invoke_async(&mut conn)
                    .await
                    .map_err(|e| StoreError::Unavailable(e.to_string()))?;

                if updated == 1 {
                    Ok(())
                } else {
                    Err(StoreError::Conflict)
                }
            }
        }
    }

    async fn delete(&self, record: &CachedCredentialRecord) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(Self::record_key(&record.user_key))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

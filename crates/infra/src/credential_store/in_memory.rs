use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use cloudgate_core::UserKey;

use super::{CachedCredentialRecord, CredentialStore, StoreError, WriteCondition};

/// In-memory credential store.
///
/// Intended for tests/dev. Enforces the same one-record-per-user and
/// conditional-write semantics as the durable backends.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    records: RwLock<HashMap<UserKey, CachedCredentialRecord>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn provision(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_all(&self, user: &UserKey) -> Result<Vec<CachedCredentialRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(records.get(user).cloned().into_iter().collect())
    }

    async fn upsert(
        &self,
        record: &CachedCredentialRecord,
        condition: WriteCondition,
    ) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;

        if let WriteCondition::LastWriteAt(expected) = condition {
            match records.get(&record.user_key) {
                Some(existing) if existing.last_write_time == expected => {}
                // Changed or deleted since read.
                _ => return Err(StoreError::Conflict),
            }
        }

        records.insert(record.user_key.clone(), record.clone());
        Ok(())
    }

    async fn delete(&self, record: &CachedCredentialRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        records.remove(&record.user_key);
        Ok(())
    }
}

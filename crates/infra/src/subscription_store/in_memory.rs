use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use cloudgate_core::{SubscriptionId, UserKey};

use super::{StoreError, SubscriptionRecord, SubscriptionStore};

/// In-memory subscription store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemorySubscriptionStore {
    records: RwLock<HashMap<(UserKey, SubscriptionId), SubscriptionRecord>>,
}

impl InMemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn provision(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list_for_user(&self, user: &UserKey) -> Result<Vec<SubscriptionRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        let mut found: Vec<SubscriptionRecord> = records
            .iter()
            .filter(|((owner, _), _)| owner == user)
            .map(|(_, record)| record.clone())
            .collect();
        found.sort_by_key(|r| r.connected_on);
        Ok(found)
    }

    async fn get(
        &self,
        user: &UserKey,
        id: SubscriptionId,
    ) -> Result<Option<SubscriptionRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        Ok(records.get(&(user.clone(), id)).cloned())
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        records.insert((record.connected_by.clone(), record.id), record.clone());
        Ok(())
    }

    async fn remove(&self, user: &UserKey, id: SubscriptionId) -> Result<(), StoreError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::Unavailable("lock poisoned".to_string()))?;
        records.remove(&(user.clone(), id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cloudgate_core::DirectoryId;
    use std::str::FromStr;

    fn record(user: &str, id: &str) -> SubscriptionRecord {
        SubscriptionRecord {
            id: SubscriptionId::from_str(id).unwrap(),
            directory_id: DirectoryId::from_str("0f8aab6b-3a68-49c5-8d5c-06ed0e1bb767").unwrap(),
            connected_by: UserKey::new(user),
            connected_on: Utc::now(),
        }
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let store = InMemorySubscriptionStore::new();
        let rec = record("alice", "e91d47c4-76f3-4271-a796-21b4ecfe3624");

        store.upsert(&rec).await.unwrap();
        assert_eq!(
            store.get(&rec.connected_by, rec.id).await.unwrap(),
            Some(rec.clone())
        );
        assert_eq!(
            store.list_for_user(&rec.connected_by).await.unwrap(),
            vec![rec.clone()]
        );

        store.remove(&rec.connected_by, rec.id).await.unwrap();
        assert!(store.get(&rec.connected_by, rec.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn listing_is_scoped_to_the_owner() {
        let store = InMemorySubscriptionStore::new();
        store
            .upsert(&record("alice", "e91d47c4-76f3-4271-a796-21b4ecfe3624"))
            .await
            .unwrap();
        store
            .upsert(&record("bob", "11111111-2222-3333-4444-555555555555"))
            .await
            .unwrap();

        let listed = store.list_for_user(&UserKey::new("alice")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].connected_by, UserKey::new("alice"));
    }
}

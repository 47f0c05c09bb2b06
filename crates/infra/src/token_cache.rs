//! One user's token cache, reconciled with the shared durable store around
//! every use.
//!
//! Multiple application instances may run the before/after pair concurrently
//! for the same user. Under the default last-write-wins policy two instances
//! can both refresh and both write; the later upsert wins and the earlier
//! writer rediscovers its loss on its own next before-access reload. That
//! window is accepted and must not be closed with a cross-process lock; the
//! strict alternative is [`WritePolicy::CheckAndSet`], whose losers see
//! [`StoreError::Conflict`] and retry the whole cycle once.

use std::sync::Arc;

use chrono::{Duration, Utc};

use cloudgate_core::UserKey;
use cloudgate_identity::TokenCacheState;

use crate::credential_store::{
    CachedCredentialRecord, CredentialStore, StoreError, WriteCondition,
};

/// Concurrency policy for after-access writes.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum WritePolicy {
    /// Unconditional upsert; concurrent writers lose silently (accepted
    /// race, original behavior).
    #[default]
    LastWriteWins,

    /// Condition the upsert on the `last_write_time` observed at load;
    /// losing surfaces [`StoreError::Conflict`].
    CheckAndSet,
}

/// A single user's token cache kept consistent with the durable store.
pub struct SyncedTokenCache {
    user_key: UserKey,
    store: Arc<dyn CredentialStore>,
    policy: WritePolicy,
    last_loaded: Option<CachedCredentialRecord>,
    live: TokenCacheState,
}

impl SyncedTokenCache {
    pub fn new(user_key: UserKey, store: Arc<dyn CredentialStore>, policy: WritePolicy) -> Self {
        Self {
            user_key,
            store,
            policy,
            last_loaded: None,
            live: TokenCacheState::empty(),
        }
    }

    pub fn user_key(&self) -> &UserKey {
        &self.user_key
    }

    /// **Before-access**: reconcile the live state with the store, then hand
    /// out a session whose [`CacheSession::commit`] is the after-access hook.
    pub async fn begin(&mut self) -> Result<CacheSession<'_>, StoreError> {
        self.before_access().await?;
        Ok(CacheSession { cache: self })
    }

    /// Delete every persisted record for the user and empty the live state.
    /// Used to force a clean re-authentication.
    pub async fn clear(&mut self) -> Result<(), StoreError> {
        for record in self.store.get_all(&self.user_key).await? {
            self.store.delete(&record).await?;
        }
        self.live.reset();
        self.last_loaded = None;
        tracing::debug!(user = %self.user_key, "token cache cleared");
        Ok(())
    }

    async fn before_access(&mut self) -> Result<(), StoreError> {
        let latest = self
            .store
            .get_all(&self.user_key)
            .await?
            .into_iter()
            .max_by_key(|r| r.last_write_time);

        // Only adopt the persisted record when it is newer than what this
        // process last loaded; a write made here earlier must not be
        // discarded because the store read raced it.
        let adopt = match (&self.last_loaded, &latest) {
            (None, _) => true,
            (Some(local), Some(fetched)) => fetched.last_write_time > local.last_write_time,
            (Some(_), None) => false,
        };

        if adopt {
            let blob = latest.as_ref().map(|r| r.blob.as_slice());
            self.live = match TokenCacheState::deserialize(blob) {
                Ok(state) => state,
                Err(e) => {
                    // An unreadable blob forces re-authentication instead of
                    // failing every request for this user.
                    tracing::warn!(user = %self.user_key, error = %e, "discarding undecodable cache blob");
                    TokenCacheState::empty()
                }
            };
            self.last_loaded = latest;
        }

        Ok(())
    }
}

/// Live access to the token-cache state between the before/after hooks.
pub struct CacheSession<'a> {
    cache: &'a mut SyncedTokenCache,
}

impl CacheSession<'_> {
    pub fn state(&self) -> &TokenCacheState {
        &self.cache.live
    }

    pub fn state_mut(&mut self) -> &mut TokenCacheState {
        &mut self.cache.live
    }

    /// **After-access**: persist the state iff it changed; otherwise no
    /// store I/O at all.
    pub async fn commit(self) -> Result<(), StoreError> {
        if !self.cache.live.state_changed() {
            return Ok(());
        }

        let blob = self
            .cache
            .live
            .serialize()
            .map_err(|e| StoreError::Codec(e.to_string()))?;

        // last_write_time strictly increases per user even under clock skew.
        let mut stamped = Utc::now();
        if let Some(previous) = &self.cache.last_loaded {
            if stamped <= previous.last_write_time {
                stamped = previous.last_write_time + Duration::microseconds(1);
            }
        }

        let condition = match self.cache.policy {
            WritePolicy::LastWriteWins => WriteCondition::None,
            WritePolicy::CheckAndSet => match &self.cache.last_loaded {
                Some(previous) => WriteCondition::LastWriteAt(previous.last_write_time),
                // Nothing was read, so there is nothing to compare against.
                None => WriteCondition::None,
            },
        };

        let record = CachedCredentialRecord {
            user_key: self.cache.user_key.clone(),
            blob,
            last_write_time: stamped,
        };
        self.cache.store.upsert(&record, condition).await?;

        self.cache.live.mark_saved();
        self.cache.last_loaded = Some(record);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

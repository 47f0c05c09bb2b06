//! `cloudgate-infra` — durable storage and the distributed token cache.
//!
//! Repository traits with in-memory (tests/dev) and Redis (production)
//! implementations, plus the [`token_cache::SyncedTokenCache`] that keeps one
//! user's live token-cache state consistent with the shared store across
//! processes.

pub mod credential_store;
pub mod subscription_store;
pub mod token_cache;

pub use credential_store::{
    CachedCredentialRecord, CredentialStore, InMemoryCredentialStore, StoreError, WriteCondition,
};
#[cfg(feature = "redis")]
pub use credential_store::RedisCredentialStore;
pub use subscription_store::{InMemorySubscriptionStore, SubscriptionRecord, SubscriptionStore};
#[cfg(feature = "redis")]
pub use subscription_store::RedisSubscriptionStore;
pub use token_cache::{CacheSession, SyncedTokenCache, WritePolicy};

//! Token acquisition seam for the orchestrator.

use std::sync::Arc;

use async_trait::async_trait;

use cloudgate_core::{DirectoryId, UserKey};
use cloudgate_identity::{
    AuthorityResolver, AzureAdSettings, DiscoveryFetcher, ResolvedAuthority, TokenClient,
    TokenGrant,
};
use cloudgate_infra::{CredentialStore, StoreError, SyncedTokenCache, WritePolicy};

use crate::error::AccessError;

/// Acquires tokens for the orchestrated workflows.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Silent user token for `resource`, scoped to the directory that owns
    /// the target subscription.
    async fn user_token(
        &self,
        user: &UserKey,
        directory_id: DirectoryId,
        resource: &str,
    ) -> Result<TokenGrant, AccessError>;

    /// App-only token (no user context) for `resource`.
    async fn app_token(
        &self,
        directory_id: DirectoryId,
        resource: &str,
    ) -> Result<TokenGrant, AccessError>;
}

#[async_trait]
impl<T> TokenSource for Arc<T>
where
    T: TokenSource + ?Sized,
{
    async fn user_token(
        &self,
        user: &UserKey,
        directory_id: DirectoryId,
        resource: &str,
    ) -> Result<TokenGrant, AccessError> {
        (**self).user_token(user, directory_id, resource).await
    }

    async fn app_token(
        &self,
        directory_id: DirectoryId,
        resource: &str,
    ) -> Result<TokenGrant, AccessError> {
        (**self).app_token(directory_id, resource).await
    }
}

/// Production token source: per-tenant authority resolution plus the
/// store-synced token cache.
pub struct CachedTokenSource {
    settings: Arc<AzureAdSettings>,
    store: Arc<dyn CredentialStore>,
    fetcher: Arc<dyn DiscoveryFetcher>,
    client: TokenClient,
    policy: WritePolicy,
}

impl CachedTokenSource {
    pub fn new(
        settings: Arc<AzureAdSettings>,
        store: Arc<dyn CredentialStore>,
        fetcher: Arc<dyn DiscoveryFetcher>,
        client: TokenClient,
        policy: WritePolicy,
    ) -> Self {
        Self {
            settings,
            store,
            fetcher,
            client,
            policy,
        }
    }

    async fn resolve(&self, directory_id: DirectoryId) -> Result<ResolvedAuthority, AccessError> {
        // One resolver per acquisition attempt; never shared across logins.
        let mut resolver = AuthorityResolver::new(
            self.settings.common_authority(),
            self.fetcher.clone(),
        );
        let authority_url = self.settings.authority_for_directory(&directory_id);
        Ok(resolver.set_authority(&authority_url).await?.clone())
    }

    /// One full before/after cycle around a silent acquisition.
    async fn acquire_cycle(
        &self,
        cache: &mut SyncedTokenCache,
        authority: &ResolvedAuthority,
        resource: &str,
        user: &UserKey,
    ) -> Result<TokenGrant, AccessError> {
        let mut session = cache.begin().await?;
        let acquired = self
            .client
            .acquire_silent(session.state_mut(), authority, resource, user)
            .await;
        let committed = session.commit().await;

        let grant = acquired?;
        committed?;
        Ok(grant)
    }
}

#[async_trait]
impl TokenSource for CachedTokenSource {
    async fn user_token(
        &self,
        user: &UserKey,
        directory_id: DirectoryId,
        resource: &str,
    ) -> Result<TokenGrant, AccessError> {
        let authority = self.resolve(directory_id).await?;
        let mut cache = SyncedTokenCache::new(user.clone(), self.store.clone(), self.policy);

        match self.acquire_cycle(&mut cache, &authority, resource, user).await {
            // A concurrent writer won the conditional write; one reload of
            // the cycle resolves it.
            Err(AccessError::Store(StoreError::Conflict)) => {
                tracing::debug!(user = %user, "conditional cache write lost; retrying cycle once");
                self.acquire_cycle(&mut cache, &authority, resource, user).await
            }
            other => other,
        }
    }

    async fn app_token(
        &self,
        directory_id: DirectoryId,
        resource: &str,
    ) -> Result<TokenGrant, AccessError> {
        let authority = self.resolve(directory_id).await?;
        Ok(self.client.acquire_for_client(&authority, resource).await?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

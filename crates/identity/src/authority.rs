//! Per-login-attempt authority state and discovery-document retrieval.
//!
//! The tenant that owns a target subscription is only learned mid-handshake,
//! so the authority is mutable state owned by one in-flight login attempt and
//! repointed at runtime. Repointing always re-fetches that tenant's discovery
//! document; a failed fetch fails the attempt rather than reusing the
//! previous tenant's document.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::IdentityError;

/// Standard discovery suffix appended to the normalized authority.
pub const DISCOVERY_SUFFIX: &str = ".well-known/openid-configuration";

/// The subset of the OpenID Connect discovery document consumed here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

/// Retrieves discovery documents. Seam for tests and alternative transports.
#[async_trait]
pub trait DiscoveryFetcher: Send + Sync {
    async fn fetch(&self, metadata_address: &str) -> Result<DiscoveryDocument, IdentityError>;
}

#[async_trait]
impl<F> DiscoveryFetcher for Arc<F>
where
    F: DiscoveryFetcher + ?Sized,
{
    async fn fetch(&self, metadata_address: &str) -> Result<DiscoveryDocument, IdentityError> {
        (**self).fetch(metadata_address).await
    }
}

/// HTTP discovery retrieval.
#[derive(Debug, Clone)]
pub struct HttpDiscoveryFetcher {
    http: reqwest::Client,
}

impl HttpDiscoveryFetcher {
    /// The client must be constructed with a timeout; a hung identity
    /// provider must not wedge the calling request.
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl DiscoveryFetcher for HttpDiscoveryFetcher {
    async fn fetch(&self, metadata_address: &str) -> Result<DiscoveryDocument, IdentityError> {
        let url = Url::parse(metadata_address).map_err(|e| {
            IdentityError::AuthorityResolutionFailed(format!("invalid metadata address: {e}"))
        })?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| IdentityError::AuthorityResolutionFailed(e.to_string()))?
            .error_for_status()
            .map_err(|e| IdentityError::AuthorityResolutionFailed(e.to_string()))?;

        response
            .json::<DiscoveryDocument>()
            .await
            .map_err(|e| {
                IdentityError::AuthorityResolutionFailed(format!("malformed metadata: {e}"))
            })
    }
}

/// An authority whose discovery document has been fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAuthority {
    /// Normalized authority URL (single trailing slash).
    pub authority: String,

    /// `{authority}/.well-known/openid-configuration`.
    pub metadata_address: String,

    pub document: DiscoveryDocument,
}

/// Mutable authority state for one in-flight authentication attempt.
///
/// Owned exclusively by one login flow; never shared across concurrent
/// logins. A fresh resolver (or [`AuthorityResolver::reset`]) starts the next
/// unrelated login back at the default authority.
pub struct AuthorityResolver {
    default_authority: String,
    fetcher: Arc<dyn DiscoveryFetcher>,
    current: Option<ResolvedAuthority>,
}

impl AuthorityResolver {
    pub fn new(default_authority: impl Into<String>, fetcher: Arc<dyn DiscoveryFetcher>) -> Self {
        Self {
            default_authority: default_authority.into(),
            fetcher,
            current: None,
        }
    }

    /// Normalize an authority URL and append the discovery suffix.
    pub fn metadata_address_for(authority: &str) -> String {
        format!("{}/{DISCOVERY_SUFFIX}", authority.trim_end_matches('/'))
    }

    /// Repoint the in-flight handshake at a tenant-specific authority and
    /// (re)fetch that tenant's discovery document, replacing whatever
    /// document was previously cached.
    ///
    /// On failure the resolver holds **no** document: falling back to the
    /// previous authority would authenticate the user against the wrong
    /// tenant.
    pub async fn set_authority(
        &mut self,
        authority: &str,
    ) -> Result<&ResolvedAuthority, IdentityError> {
        let normalized = format!("{}/", authority.trim_end_matches('/'));
        let metadata_address = Self::metadata_address_for(authority);

        // Invalidate first so a fetch failure cannot leave a stale document.
        self.current = None;

        let document = self.fetcher.fetch(&metadata_address).await?;
        tracing::debug!(authority = %normalized, issuer = %document.issuer, "authority resolved");

        Ok(self.current.insert(ResolvedAuthority {
            authority: normalized,
            metadata_address,
            document,
        }))
    }

    /// Resolve the default ("common") authority.
    pub async fn resolve_default(&mut self) -> Result<&ResolvedAuthority, IdentityError> {
        let default = self.default_authority.clone();
        self.set_authority(&default).await
    }

    /// Drop the current document; the next attempt starts from scratch.
    pub fn reset(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&ResolvedAuthority> {
        self.current.as_ref()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct StubFetcher;

    #[async_trait]
    impl DiscoveryFetcher for StubFetcher {
        async fn fetch(&self, metadata_address: &str) -> Result<DiscoveryDocument, IdentityError> {
            if metadata_address.contains("broken") {
                return Err(IdentityError::AuthorityResolutionFailed(
                    "metadata unreachable".to_string(),
                ));
            }
            // Echo the address back so tests can tell documents apart.
            Ok(DiscoveryDocument {
                issuer: metadata_address.replace(DISCOVERY_SUFFIX, ""),
                authorization_endpoint: format!("{metadata_address}#authorize"),
                token_endpoint: format!("{metadata_address}#token"),
                jwks_uri: format!("{metadata_address}#keys"),
            })
        }
    }

    fn resolver() -> AuthorityResolver {
        AuthorityResolver::new("https://login.example.com/common", Arc::new(StubFetcher))
    }

    #[test]
    fn metadata_address_gets_single_trailing_separator() {
        assert_eq!(
            AuthorityResolver::metadata_address_for("https://login.example.com/tenant-a"),
            "https://login.example.com/tenant-a/.well-known/openid-configuration"
        );
        assert_eq!(
            AuthorityResolver::metadata_address_for("https://login.example.com/tenant-a/"),
            "https://login.example.com/tenant-a/.well-known/openid-configuration"
        );
    }

    #[tokio::test]
    async fn each_attempt_sees_only_its_own_document() {
        let mut first = resolver();
        let doc_a = first
            .set_authority("https://login.example.com/tenant-a")
            .await
            .unwrap()
            .document
            .clone();

        let mut second = resolver();
        let doc_b = second
            .set_authority("https://login.example.com/tenant-b")
            .await
            .unwrap()
            .document
            .clone();

        assert!(doc_a.issuer.contains("tenant-a"));
        assert!(doc_b.issuer.contains("tenant-b"));
        assert!(!doc_b.issuer.contains("tenant-a"));
    }

    #[tokio::test]
    async fn repointing_replaces_the_cached_document() {
        let mut resolver = resolver();
        resolver
            .set_authority("https://login.example.com/tenant-a")
            .await
            .unwrap();
        resolver
            .set_authority("https://login.example.com/tenant-b")
            .await
            .unwrap();

        let current = resolver.current().unwrap();
        assert!(current.document.issuer.contains("tenant-b"));
    }

    #[tokio::test]
    async fn fetch_failure_leaves_no_document_behind() {
        let mut resolver = resolver();
        resolver
            .set_authority("https://login.example.com/tenant-a")
            .await
            .unwrap();

        let err = resolver
            .set_authority("https://login.example.com/broken")
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::AuthorityResolutionFailed(_)));
        // No silent fallback to tenant-a.
        assert!(resolver.current().is_none());
    }
}

//! `cloudgate-identity` — multi-tenant identity-provider plumbing.
//!
//! Authority resolution + discovery, the serializable token-cache state
//! object, the OAuth2 token client (code redemption, silent acquisition,
//! client credentials) and the post-issuance issuer trust check.
//!
//! Durable persistence of the cache state lives in `cloudgate-infra`; this
//! crate only defines the state object and the protocol flows over it.

pub mod authority;
pub mod cache_state;
pub mod client;
pub mod error;
pub mod issuer;
pub mod settings;

pub use authority::{
    AuthorityResolver, DISCOVERY_SUFFIX, DiscoveryDocument, DiscoveryFetcher, HttpDiscoveryFetcher,
    ResolvedAuthority,
};
pub use cache_state::{TokenCacheState, TokenEntry};
pub use client::{TokenClient, TokenGrant};
pub use error::IdentityError;
pub use issuer::{IdTokenClaims, check_issuer, extract_claims};
pub use settings::AzureAdSettings;

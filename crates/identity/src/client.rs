//! OAuth2 token client for a confidential client against a resolved
//! authority (AAD-v1 shaped: `resource` parameter, seconds-based expiry).

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use cloudgate_core::UserKey;

use crate::authority::ResolvedAuthority;
use crate::cache_state::{TokenCacheState, TokenEntry};
use crate::error::IdentityError;

/// Tokens within this window of expiry are treated as expired so a request
/// started with a nearly-dead token cannot outlive it mid-flight.
const EXPIRY_SKEW_SECS: i64 = 300;

const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// An acquired access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub token_type: String,
    pub expires_on: DateTime<Utc>,
}

/// Confidential-client token acquisition over a [`ResolvedAuthority`]'s
/// token endpoint.
#[derive(Debug, Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
}

impl TokenClient {
    /// The client must be constructed with a timeout (see
    /// [`crate::settings::AzureAdSettings::http_timeout`]).
    pub fn new(
        http: reqwest::Client,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Acquire a token for `user` without any interaction: from the cache
    /// state if still valid, else via `grant_type=refresh_token`.
    ///
    /// `SilentAuthFailed` is the expected miss outcome; the caller falls back
    /// to interactive login.
    pub async fn acquire_silent(
        &self,
        state: &mut TokenCacheState,
        authority: &ResolvedAuthority,
        resource: &str,
        user: &UserKey,
    ) -> Result<TokenGrant, IdentityError> {
        let now = Utc::now();

        let Some(entry) = state.lookup(&authority.authority, resource, Some(user)) else {
            return Err(IdentityError::SilentAuthFailed(format!(
                "no cached token for user '{user}'"
            )));
        };

        if entry.expires_on - Duration::seconds(EXPIRY_SKEW_SECS) > now {
            return Ok(grant_of(entry));
        }

        let Some(refresh_token) = entry.refresh_token.clone() else {
            return Err(IdentityError::SilentAuthFailed(
                "cached token expired and no refresh token is available".to_string(),
            ));
        };

        tracing::debug!(user = %user, resource, "cached token expired; refreshing");
        let response = self
            .post_token(
                &authority.document.token_endpoint,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.as_str()),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("resource", resource),
                ],
                true,
            )
            .await?;

        let entry = response.into_entry(
            authority,
            resource,
            Some(user.clone()),
            Some(refresh_token),
        );
        let grant = grant_of(&entry);
        state.upsert(entry);
        Ok(grant)
    }

    /// Redeem an authorization code and store the resulting tokens for
    /// `user` in the cache state.
    pub async fn redeem_authorization_code(
        &self,
        state: &mut TokenCacheState,
        authority: &ResolvedAuthority,
        user: &UserKey,
        code: &str,
        redirect_uri: &str,
        resource: &str,
    ) -> Result<TokenGrant, IdentityError> {
        let response = self
            .post_token(
                &authority.document.token_endpoint,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", redirect_uri),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("resource", resource),
                ],
                false,
            )
            .await?;

        let entry = response.into_entry(authority, resource, Some(user.clone()), None);
        let grant = grant_of(&entry);
        state.upsert(entry);
        Ok(grant)
    }

    /// App-only token via `grant_type=client_credentials`. Not written to
    /// any durable cache; service tokens are short-lived and per-process.
    pub async fn acquire_for_client(
        &self,
        authority: &ResolvedAuthority,
        resource: &str,
    ) -> Result<TokenGrant, IdentityError> {
        let response = self
            .post_token(
                &authority.document.token_endpoint,
                &[
                    ("grant_type", "client_credentials"),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("resource", resource),
                ],
                false,
            )
            .await?;

        let entry = response.into_entry(authority, resource, None, None);
        Ok(grant_of(&entry))
    }

    async fn post_token(
        &self,
        token_endpoint: &str,
        form: &[(&str, &str)],
        silent: bool,
    ) -> Result<TokenEndpointResponse, IdentityError> {
        let response = self
            .http
            .post(token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenEndpointResponse>()
                .await
                .map_err(|e| IdentityError::Transport(format!("malformed token response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<TokenErrorResponse>(&body)
            .map(|e| e.describe())
            .unwrap_or(body);

        // An expired/revoked refresh token is a routine silent-auth miss,
        // not a fault.
        if silent && detail.contains("invalid_grant") {
            return Err(IdentityError::SilentAuthFailed(detail));
        }

        Err(IdentityError::TokenEndpoint {
            status: status.as_u16(),
            detail,
        })
    }
}

fn grant_of(entry: &TokenEntry) -> TokenGrant {
    TokenGrant {
        access_token: entry.access_token.clone(),
        token_type: entry.token_type.clone(),
        expires_on: entry.expires_on,
    }
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<Numberish>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenEndpointResponse {
    /// Build a cache entry; `prior_refresh_token` is kept when the provider
    /// does not rotate the refresh token.
    fn into_entry(
        self,
        authority: &ResolvedAuthority,
        resource: &str,
        user: Option<UserKey>,
        prior_refresh_token: Option<String>,
    ) -> TokenEntry {
        let lifetime = self
            .expires_in
            .and_then(|n| n.as_secs())
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        TokenEntry {
            authority: authority.authority.clone(),
            resource: resource.to_string(),
            user,
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(prior_refresh_token),
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_on: Utc::now() + Duration::seconds(lifetime),
        }
    }
}

/// AAD v1 serializes numbers as strings (`"expires_in":"3599"`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numberish {
    Int(i64),
    Text(String),
}

impl Numberish {
    fn as_secs(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl TokenErrorResponse {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {}", self.error, description),
            None => self.error.clone(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Identity-layer error.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The tenant's discovery document could not be fetched or parsed.
    /// Fatal to the current login attempt; the previous authority must not
    /// be silently reused.
    #[error("authority resolution failed: {0}")]
    AuthorityResolutionFailed(String),

    /// An issued token's issuer claim does not match the trusted prefix.
    /// Fatal; the session must be rejected.
    #[error("untrusted issuer: {issuer}")]
    UntrustedIssuer { issuer: String },

    /// No valid cached or refreshable token exists for the user. Expected;
    /// the caller falls back to interactive login.
    #[error("silent token acquisition failed: {0}")]
    SilentAuthFailed(String),

    /// The token endpoint returned a non-success response.
    #[error("token endpoint returned {status}: {detail}")]
    TokenEndpoint { status: u16, detail: String },

    /// Transport-level failure talking to the identity provider.
    #[error("identity provider transport error: {0}")]
    Transport(String),

    /// An id token could not be decoded into claims.
    #[error("invalid token claims: {0}")]
    Claims(String),

    /// Settings were missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

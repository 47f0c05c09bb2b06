use thiserror::Error;

/// Resource-management / directory API error.
///
/// Callers must treat every variant as "cannot determine grants": the
/// orchestrator resolves them to not-authorized, never to authorized.
#[derive(Debug, Error)]
pub enum ArmError {
    /// Non-2xx from the upstream API.
    #[error("{operation} returned {status}")]
    Upstream { operation: &'static str, status: u16 },

    /// Transport-level failure (connect, timeout, body read).
    #[error("{operation} transport error: {detail}")]
    Transport {
        operation: &'static str,
        detail: String,
    },

    /// The response body did not have the expected shape.
    #[error("{operation} returned a malformed body: {detail}")]
    Malformed {
        operation: &'static str,
        detail: String,
    },

    /// The owning directory of a subscription could not be extracted from
    /// the challenge header.
    #[error("could not determine owning directory for subscription {subscription_id}")]
    DirectoryUndetermined { subscription_id: String },
}

//! Stable per-user key for durable state (token cache rows, subscription rows).

use serde::{Deserialize, Serialize};

/// Stable unique name of a signed-in principal.
///
/// Derived from the identity provider's display-name claim: guest accounts
/// surface as `live.com#user@example.com`, so the key is the segment after
/// the last `#`. This assumes UPN-style display names; other identity
/// providers may need a different derivation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserKey(String);

impl UserKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the stable key from a display-name claim.
    pub fn from_display_name(display_name: &str) -> Self {
        let key = display_name
            .rsplit('#')
            .next()
            .unwrap_or(display_name)
            .to_string();
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for UserKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for UserKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! The live token-cache object: a serializable set of token entries plus a
//! dirty flag.
//!
//! Persistence is deliberately elsewhere (`cloudgate-infra` reconciles this
//! state with the durable store around every use); this module only defines
//! the state, its lookup/update rules and the blob codec.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cloudgate_core::UserKey;

/// One cached token, keyed by `(authority, resource, user)`.
///
/// `user` is `None` for app-only tokens, which in practice are never written
/// to the durable cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub authority: String,
    pub resource: String,
    pub user: Option<UserKey>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_on: DateTime<Utc>,
}

impl TokenEntry {
    fn matches(&self, authority: &str, resource: &str, user: Option<&UserKey>) -> bool {
        self.authority == authority && self.resource == resource && self.user.as_ref() == user
    }
}

/// In-memory token cache state for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCacheState {
    entries: Vec<TokenEntry>,

    /// True once the entries diverge from the last persisted blob.
    #[serde(skip)]
    state_changed: bool,
}

impl TokenCacheState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn state_changed(&self) -> bool {
        self.state_changed
    }

    /// Reset the dirty flag after the state has been persisted.
    pub fn mark_saved(&mut self) {
        self.state_changed = false;
    }

    pub fn lookup(
        &self,
        authority: &str,
        resource: &str,
        user: Option<&UserKey>,
    ) -> Option<&TokenEntry> {
        self.entries
            .iter()
            .find(|e| e.matches(authority, resource, user))
    }

    /// Insert or replace the entry with the same `(authority, resource,
    /// user)` key, marking the state dirty.
    pub fn upsert(&mut self, entry: TokenEntry) {
        self.entries.retain(|e| {
            !e.matches(&entry.authority, &entry.resource, entry.user.as_ref())
        });
        self.entries.push(entry);
        self.state_changed = true;
    }

    /// Drop every entry. Used when a fresh authentication must not reuse
    /// prior tokens; the durable records are deleted separately, so this does
    /// not mark the state dirty.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.state_changed = false;
    }

    /// Serialize to the opaque blob persisted by the credential store.
    pub fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize a persisted blob. `None` (no record yet) yields the empty
    /// state rather than an error.
    pub fn deserialize(blob: Option<&[u8]>) -> Result<Self, serde_json::Error> {
        match blob {
            None => Ok(Self::empty()),
            Some(bytes) if bytes.is_empty() => Ok(Self::empty()),
            Some(bytes) => serde_json::from_slice(bytes),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(resource: &str, user: &str) -> TokenEntry {
        TokenEntry {
            authority: "https://login.example.com/tenant/".to_string(),
            resource: resource.to_string(),
            user: Some(UserKey::new(user)),
            access_token: "at".to_string(),
            refresh_token: Some("rt".to_string()),
            token_type: "Bearer".to_string(),
            expires_on: Utc::now(),
        }
    }

    #[test]
    fn round_trip_empty_state() {
        let state = TokenCacheState::empty();
        let blob = state.serialize().unwrap();
        assert_eq!(TokenCacheState::deserialize(Some(&blob)).unwrap(), state);
    }

    #[test]
    fn round_trip_populated_state() {
        let mut state = TokenCacheState::empty();
        state.upsert(entry("https://management.core.windows.net/", "alice"));
        state.upsert(entry("https://graph.windows.net/", "alice"));
        state.mark_saved();

        let blob = state.serialize().unwrap();
        let restored = TokenCacheState::deserialize(Some(&blob)).unwrap();
        assert_eq!(restored, state);
        assert!(!restored.state_changed());
    }

    #[test]
    fn absent_blob_deserializes_to_empty() {
        let state = TokenCacheState::deserialize(None).unwrap();
        assert!(state.is_empty());
    }

    #[test]
    fn upsert_replaces_entry_with_same_key_and_marks_dirty() {
        let mut state = TokenCacheState::empty();
        state.upsert(entry("resource", "alice"));
        state.mark_saved();

        let mut replacement = entry("resource", "alice");
        replacement.access_token = "at2".to_string();
        state.upsert(replacement);

        assert!(state.state_changed());
        let found = state
            .lookup(
                "https://login.example.com/tenant/",
                "resource",
                Some(&UserKey::new("alice")),
            )
            .unwrap();
        assert_eq!(found.access_token, "at2");
    }

    #[test]
    fn reset_empties_without_dirtying() {
        let mut state = TokenCacheState::empty();
        state.upsert(entry("resource", "alice"));
        state.reset();
        assert!(state.is_empty());
        assert!(!state.state_changed());
    }
}

use serde::{Deserialize, Serialize};

/// One role assignment's effect on a principal for a subscription.
///
/// Patterns are case-insensitive action strings where `*` matches any
/// substring. A grant allows an action when some `actions` pattern matches it
/// and no `not_actions` pattern does. Grants compose by logical OR: a broader
/// grant can restore access that a narrower grant's `not_actions` excludes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionGrant {
    pub actions: Vec<String>,
    pub not_actions: Vec<String>,
}

impl PermissionGrant {
    pub fn new(
        actions: impl IntoIterator<Item = impl Into<String>>,
        not_actions: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            not_actions: not_actions.into_iter().map(Into::into).collect(),
        }
    }
}

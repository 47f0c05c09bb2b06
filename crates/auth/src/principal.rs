use serde::{Deserialize, Serialize};

use cloudgate_core::{DirectoryId, UserKey};

/// The authenticated principal for one request.
///
/// Built once from validated token claims and passed explicitly into every
/// function that needs it; there is no ambient "current user" lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedInUser {
    /// Raw display-name claim as issued.
    pub display_name: String,

    /// Stable key used for durable per-user state.
    pub user_key: UserKey,

    /// Directory (tenant) the user authenticated against.
    pub directory_id: DirectoryId,
}

impl SignedInUser {
    pub fn new(display_name: impl Into<String>, directory_id: DirectoryId) -> Self {
        let display_name = display_name.into();
        let user_key = UserKey::from_display_name(&display_name);
        Self {
            display_name,
            user_key,
            directory_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn user_key_is_derived_from_display_name() {
        let directory = DirectoryId::from_str("f5cbbf24-6fa8-4b64-9a02-7d105d106d63").unwrap();
        let user = SignedInUser::new("live.com#bob@outlook.com", directory);
        assert_eq!(user.user_key.as_str(), "bob@outlook.com");
        assert_eq!(user.display_name, "live.com#bob@outlook.com");
    }
}

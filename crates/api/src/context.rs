use cloudgate_auth::SignedInUser;

/// Request-scoped authenticated user.
///
/// Built once by the auth middleware from validated token claims and read by
/// handlers through an extension; there is no ambient "current principal"
/// lookup anywhere in the codebase.
#[derive(Debug, Clone)]
pub struct UserContext {
    user: SignedInUser,
}

impl UserContext {
    pub fn new(user: SignedInUser) -> Self {
        Self { user }
    }

    pub fn user(&self) -> &SignedInUser {
        &self.user
    }
}

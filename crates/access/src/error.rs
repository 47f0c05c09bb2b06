use thiserror::Error;

use cloudgate_arm::ArmError;
use cloudgate_identity::IdentityError;
use cloudgate_infra::StoreError;

/// Composite error for the orchestrated workflows.
///
/// Authorization checks never surface this (they fail closed to a boolean);
/// the grant/revoke workflows return it to the caller as a failure outcome.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Arm(#[from] ArmError),

    #[error("role definition '{0}' not found on subscription")]
    RoleNotFound(String),

    #[error("service principal for the application not found in directory")]
    ServicePrincipalNotFound,
}

impl AccessError {
    /// True when the silent token path missed and the caller should fall
    /// back to interactive login.
    pub fn requires_interactive_login(&self) -> bool {
        matches!(self, Self::Identity(IdentityError::SilentAuthFailed(_)))
    }
}

//! End-to-end authorization workflows.

use std::sync::Arc;

use cloudgate_arm::{ArmError, DirectoryApi, ResourceManagerApi};
use cloudgate_auth::{EvaluationMode, PermissionGrant, ROLE_ASSIGNMENT_WRITE_ACTION, evaluate};
use cloudgate_core::{DirectoryId, SubscriptionId, UserKey};
use cloudgate_identity::AzureAdSettings;

use crate::error::AccessError;
use crate::token_source::TokenSource;

/// Drives the two authorization decisions and the role grant/revoke
/// workflows built on them.
///
/// Grants are re-fetched from the management API on every decision; stale
/// permissions are never consulted.
pub struct AccessOrchestrator {
    settings: Arc<AzureAdSettings>,
    tokens: Arc<dyn TokenSource>,
    arm: Arc<dyn ResourceManagerApi>,
    directory: Arc<dyn DirectoryApi>,
}

impl AccessOrchestrator {
    pub fn new(
        settings: Arc<AzureAdSettings>,
        tokens: Arc<dyn TokenSource>,
        arm: Arc<dyn ResourceManagerApi>,
        directory: Arc<dyn DirectoryApi>,
    ) -> Self {
        Self {
            settings,
            tokens,
            arm,
            directory,
        }
    }

    /// Can the signed-in user create role assignments on the subscription?
    ///
    /// Any failure along the way (silent auth miss, store fault, upstream
    /// error, malformed grants) answers `false`.
    pub async fn can_user_manage_access(
        &self,
        user: &UserKey,
        subscription_id: SubscriptionId,
        directory_id: DirectoryId,
    ) -> bool {
        match self.user_grants(user, subscription_id, directory_id).await {
            Ok(grants) => evaluate(&grants, ROLE_ASSIGNMENT_WRITE_ACTION, EvaluationMode::Exact),
            Err(e) => {
                tracing::warn!(user = %user, subscription = %subscription_id, error = %e,
                    "grant check failed; treating as not authorized");
                false
            }
        }
    }

    /// Does the application's service identity still have read access to the
    /// subscription?
    pub async fn service_identity_has_read_access(
        &self,
        subscription_id: SubscriptionId,
        directory_id: DirectoryId,
    ) -> bool {
        let grants = async {
            let token = self
                .tokens
                .app_token(directory_id, &self.settings.resource_manager_identifier)
                .await?;
            Ok::<_, AccessError>(
                self.arm
                    .permissions_for_subscription(subscription_id, &token.access_token)
                    .await?,
            )
        }
        .await;

        match grants {
            Ok(grants) => evaluate(&grants, "", EvaluationMode::CoarseRead),
            Err(e) => {
                tracing::warn!(subscription = %subscription_id, error = %e,
                    "service identity check failed; treating as not authorized");
                false
            }
        }
    }

    /// Grant the configured role to the application's service principal on a
    /// subscription. Returns the new assignment id.
    pub async fn grant_role_to_service_principal(
        &self,
        user: &UserKey,
        subscription_id: SubscriptionId,
        directory_id: DirectoryId,
    ) -> Result<String, AccessError> {
        let user_token = self
            .tokens
            .user_token(user, directory_id, &self.settings.resource_manager_identifier)
            .await?;

        let object_id = self.service_principal_object_id(directory_id).await?;

        let role_definition_id = self
            .arm
            .find_role_definition_id(
                subscription_id,
                &self.settings.required_arm_role,
                &user_token.access_token,
            )
            .await?
            .ok_or_else(|| AccessError::RoleNotFound(self.settings.required_arm_role.clone()))?;

        let assignment_id = self
            .arm
            .create_role_assignment(
                subscription_id,
                &role_definition_id,
                &object_id,
                &user_token.access_token,
            )
            .await?;

        Ok(assignment_id)
    }

    /// Remove every role assignment the application's service principal
    /// holds on a subscription. Returns how many were deleted.
    pub async fn revoke_role_from_service_principal(
        &self,
        user: &UserKey,
        subscription_id: SubscriptionId,
        directory_id: DirectoryId,
    ) -> Result<usize, AccessError> {
        let user_token = self
            .tokens
            .user_token(user, directory_id, &self.settings.resource_manager_identifier)
            .await?;

        let object_id = self.service_principal_object_id(directory_id).await?;

        let assignments = self
            .arm
            .role_assignments_for_principal(subscription_id, &object_id, &user_token.access_token)
            .await?;

        let mut deleted = 0;
        for assignment in &assignments {
            self.arm
                .delete_role_assignment(&assignment.id, &user_token.access_token)
                .await?;
            deleted += 1;
        }
        Ok(deleted)
    }

    /// Revoke then re-grant, for connections whose assignment was removed
    /// out of band.
    pub async fn repair_connection(
        &self,
        user: &UserKey,
        subscription_id: SubscriptionId,
        directory_id: DirectoryId,
    ) -> Result<String, AccessError> {
        self.revoke_role_from_service_principal(user, subscription_id, directory_id)
            .await?;
        self.grant_role_to_service_principal(user, subscription_id, directory_id)
            .await
    }

    /// Which directory owns this subscription (unauthenticated challenge
    /// probe).
    pub async fn directory_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<DirectoryId, ArmError> {
        self.arm.directory_for_subscription(subscription_id).await
    }

    async fn user_grants(
        &self,
        user: &UserKey,
        subscription_id: SubscriptionId,
        directory_id: DirectoryId,
    ) -> Result<Vec<PermissionGrant>, AccessError> {
        let token = self
            .tokens
            .user_token(user, directory_id, &self.settings.resource_manager_identifier)
            .await?;
        Ok(self
            .arm
            .permissions_for_subscription(subscription_id, &token.access_token)
            .await?)
    }

    async fn service_principal_object_id(
        &self,
        directory_id: DirectoryId,
    ) -> Result<String, AccessError> {
        let app_token = self
            .tokens
            .app_token(directory_id, &self.settings.graph_api_identifier)
            .await?;
        self.directory
            .service_principal_object_id(directory_id, &self.settings.client_id, &app_token.access_token)
            .await?
            .ok_or(AccessError::ServicePrincipalNotFound)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use cloudgate_arm::RoleAssignment;
    use cloudgate_identity::{IdentityError, TokenGrant};
    use std::str::FromStr;
    use std::sync::Mutex;

    struct StaticTokens {
        silent_auth_fails: bool,
    }

    #[async_trait]
    impl TokenSource for StaticTokens {
        async fn user_token(
            &self,
            _user: &UserKey,
            _directory_id: DirectoryId,
            _resource: &str,
        ) -> Result<TokenGrant, AccessError> {
            if self.silent_auth_fails {
                return Err(IdentityError::SilentAuthFailed("no cached token".to_string()).into());
            }
            Ok(grant("user-token"))
        }

        async fn app_token(
            &self,
            _directory_id: DirectoryId,
            _resource: &str,
        ) -> Result<TokenGrant, AccessError> {
            Ok(grant("app-token"))
        }
    }

    fn grant(token: &str) -> TokenGrant {
        TokenGrant {
            access_token: token.to_string(),
            token_type: "Bearer".to_string(),
            expires_on: Utc::now() + Duration::hours(1),
        }
    }

    struct FakeArm {
        grants: Result<Vec<PermissionGrant>, u16>,
        deleted: Mutex<Vec<String>>,
    }

    impl FakeArm {
        fn with_grants(grants: Vec<PermissionGrant>) -> Self {
            Self {
                grants: Ok(grants),
                deleted: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                grants: Err(status),
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ResourceManagerApi for FakeArm {
        async fn directory_for_subscription(
            &self,
            _subscription_id: SubscriptionId,
        ) -> Result<DirectoryId, ArmError> {
            Ok(directory())
        }

        async fn permissions_for_subscription(
            &self,
            _subscription_id: SubscriptionId,
            _access_token: &str,
        ) -> Result<Vec<PermissionGrant>, ArmError> {
            match &self.grants {
                Ok(grants) => Ok(grants.clone()),
                Err(status) => Err(ArmError::Upstream {
                    operation: "permissions fetch",
                    status: *status,
                }),
            }
        }

        async fn find_role_definition_id(
            &self,
            _subscription_id: SubscriptionId,
            role_name: &str,
            _access_token: &str,
        ) -> Result<Option<String>, ArmError> {
            if role_name.eq_ignore_ascii_case("contributor") {
                Ok(Some("/subscriptions/s/roleDefinitions/b24988ac".to_string()))
            } else {
                Ok(None)
            }
        }

        async fn create_role_assignment(
            &self,
            _subscription_id: SubscriptionId,
            role_definition_id: &str,
            principal_object_id: &str,
            _access_token: &str,
        ) -> Result<String, ArmError> {
            assert_eq!(role_definition_id, "/subscriptions/s/roleDefinitions/b24988ac");
            assert_eq!(principal_object_id, "sp-object-id");
            Ok("new-assignment".to_string())
        }

        async fn role_assignments_for_principal(
            &self,
            _subscription_id: SubscriptionId,
            _principal_object_id: &str,
            _access_token: &str,
        ) -> Result<Vec<RoleAssignment>, ArmError> {
            Ok(vec![
                RoleAssignment {
                    id: "/subscriptions/s/roleAssignments/one".to_string(),
                },
                RoleAssignment {
                    id: "/subscriptions/s/roleAssignments/two".to_string(),
                },
            ])
        }

        async fn delete_role_assignment(
            &self,
            assignment_path: &str,
            _access_token: &str,
        ) -> Result<(), ArmError> {
            self.deleted.lock().unwrap().push(assignment_path.to_string());
            Ok(())
        }
    }

    struct FakeDirectory;

    #[async_trait]
    impl DirectoryApi for FakeDirectory {
        async fn service_principal_object_id(
            &self,
            _directory_id: DirectoryId,
            _app_id: &str,
            _access_token: &str,
        ) -> Result<Option<String>, ArmError> {
            Ok(Some("sp-object-id".to_string()))
        }
    }

    fn settings() -> Arc<AzureAdSettings> {
        Arc::new(AzureAdSettings {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "http://localhost:8080/auth/callback".to_string(),
            authority_template: "https://login.example.com/{directory}/".to_string(),
            resource_manager_identifier: "https://management.core.windows.net/".to_string(),
            resource_manager_url: "https://management.azure.com".to_string(),
            graph_api_identifier: "https://graph.windows.net/".to_string(),
            graph_api_version: "1.6".to_string(),
            required_arm_role: "Contributor".to_string(),
            trusted_issuer_prefix: "https://sts.windows.net/".to_string(),
            permissions_api_version: "2014-07-01-preview".to_string(),
            role_assignments_api_version: "2014-10-01-preview".to_string(),
            role_definitions_api_version: "2014-07-01-preview".to_string(),
            http_timeout_secs: 5,
        })
    }

    fn orchestrator(arm: FakeArm, silent_auth_fails: bool) -> AccessOrchestrator {
        AccessOrchestrator::new(
            settings(),
            Arc::new(StaticTokens { silent_auth_fails }),
            Arc::new(arm),
            Arc::new(FakeDirectory),
        )
    }

    fn subscription() -> SubscriptionId {
        SubscriptionId::from_str("e91d47c4-76f3-4271-a796-21b4ecfe3624").unwrap()
    }

    fn directory() -> DirectoryId {
        DirectoryId::from_str("0f8aab6b-3a68-49c5-8d5c-06ed0e1bb767").unwrap()
    }

    fn user() -> UserKey {
        UserKey::new("alice@contoso.com")
    }

    #[tokio::test]
    async fn owner_grant_authorizes_role_assignment_write() {
        let arm = FakeArm::with_grants(vec![PermissionGrant::new(["*"], Vec::<String>::new())]);
        let orchestrator = orchestrator(arm, false);
        assert!(
            orchestrator
                .can_user_manage_access(&user(), subscription(), directory())
                .await
        );
    }

    #[tokio::test]
    async fn not_action_veto_denies_role_assignment_write() {
        let arm = FakeArm::with_grants(vec![PermissionGrant::new(
            ["*"],
            ["Microsoft.Authorization/*/Write"],
        )]);
        let orchestrator = orchestrator(arm, false);
        assert!(
            !orchestrator
                .can_user_manage_access(&user(), subscription(), directory())
                .await
        );
    }

    #[tokio::test]
    async fn upstream_error_fails_closed() {
        let orchestrator = orchestrator(FakeArm::failing(500), false);
        assert!(
            !orchestrator
                .can_user_manage_access(&user(), subscription(), directory())
                .await
        );
        assert!(
            !orchestrator
                .service_identity_has_read_access(subscription(), directory())
                .await
        );
    }

    #[tokio::test]
    async fn silent_auth_miss_fails_closed() {
        let arm = FakeArm::with_grants(vec![PermissionGrant::new(["*"], Vec::<String>::new())]);
        let orchestrator = orchestrator(arm, true);
        assert!(
            !orchestrator
                .can_user_manage_access(&user(), subscription(), directory())
                .await
        );
    }

    #[tokio::test]
    async fn empty_grants_fail_closed() {
        let orchestrator = orchestrator(FakeArm::with_grants(Vec::new()), false);
        assert!(
            !orchestrator
                .can_user_manage_access(&user(), subscription(), directory())
                .await
        );
    }

    #[tokio::test]
    async fn service_identity_read_grant_authorizes() {
        let arm = FakeArm::with_grants(vec![PermissionGrant::new(["*/read"], Vec::<String>::new())]);
        let orchestrator = orchestrator(arm, false);
        assert!(
            orchestrator
                .service_identity_has_read_access(subscription(), directory())
                .await
        );
    }

    #[tokio::test]
    async fn grant_workflow_creates_assignment_for_configured_role() {
        let orchestrator = orchestrator(FakeArm::with_grants(Vec::new()), false);
        let assignment = orchestrator
            .grant_role_to_service_principal(&user(), subscription(), directory())
            .await
            .unwrap();
        assert_eq!(assignment, "new-assignment");
    }

    #[tokio::test]
    async fn revoke_workflow_deletes_every_assignment() {
        let arm = Arc::new(FakeArm::with_grants(Vec::new()));
        let orchestrator = AccessOrchestrator::new(
            settings(),
            Arc::new(StaticTokens {
                silent_auth_fails: false,
            }),
            arm.clone(),
            Arc::new(FakeDirectory),
        );

        let deleted = orchestrator
            .revoke_role_from_service_principal(&user(), subscription(), directory())
            .await
            .unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(
            *arm.deleted.lock().unwrap(),
            vec![
                "/subscriptions/s/roleAssignments/one".to_string(),
                "/subscriptions/s/roleAssignments/two".to_string(),
            ]
        );
    }
}

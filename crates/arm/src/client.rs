//! Resource Manager API client.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use cloudgate_auth::PermissionGrant;
use cloudgate_core::{DirectoryId, SubscriptionId};

use crate::error::ArmError;
use crate::models::{RoleAssignment, RoleDefinition, ValueEnvelope};

/// api-version per ARM endpoint family.
#[derive(Debug, Clone)]
pub struct ArmApiVersions {
    pub subscriptions: String,
    pub permissions: String,
    pub role_assignments: String,
    pub role_definitions: String,
}

impl Default for ArmApiVersions {
    fn default() -> Self {
        Self {
            subscriptions: "2014-04-01".to_string(),
            permissions: "2014-07-01-preview".to_string(),
            role_assignments: "2014-10-01-preview".to_string(),
            role_definitions: "2014-07-01-preview".to_string(),
        }
    }
}

/// The slice of the Resource Manager API the authorization core consumes.
/// Seam for the orchestrator and its tests.
#[async_trait]
pub trait ResourceManagerApi: Send + Sync {
    /// Discover which directory owns a subscription by reading the
    /// `WWW-Authenticate` challenge of an unauthenticated request.
    async fn directory_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<DirectoryId, ArmError>;

    /// The caller's effective permission grants on a subscription.
    async fn permissions_for_subscription(
        &self,
        subscription_id: SubscriptionId,
        access_token: &str,
    ) -> Result<Vec<PermissionGrant>, ArmError>;

    /// Resolve a role definition id by (case-insensitive) role name.
    async fn find_role_definition_id(
        &self,
        subscription_id: SubscriptionId,
        role_name: &str,
        access_token: &str,
    ) -> Result<Option<String>, ArmError>;

    /// Create a role assignment (fresh assignment id); returns the id.
    async fn create_role_assignment(
        &self,
        subscription_id: SubscriptionId,
        role_definition_id: &str,
        principal_object_id: &str,
        access_token: &str,
    ) -> Result<String, ArmError>;

    /// All role assignments held by a principal on a subscription.
    async fn role_assignments_for_principal(
        &self,
        subscription_id: SubscriptionId,
        principal_object_id: &str,
        access_token: &str,
    ) -> Result<Vec<RoleAssignment>, ArmError>;

    /// Delete a role assignment by its full ARM path.
    async fn delete_role_assignment(
        &self,
        assignment_path: &str,
        access_token: &str,
    ) -> Result<(), ArmError>;
}

#[async_trait]
impl<A> ResourceManagerApi for Arc<A>
where
    A: ResourceManagerApi + ?Sized,
{
    async fn directory_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<DirectoryId, ArmError> {
        (**self).directory_for_subscription(subscription_id).await
    }

    async fn permissions_for_subscription(
        &self,
        subscription_id: SubscriptionId,
        access_token: &str,
    ) -> Result<Vec<PermissionGrant>, ArmError> {
        (**self)
            .permissions_for_subscription(subscription_id, access_token)
            .await
    }

    async fn find_role_definition_id(
        &self,
        subscription_id: SubscriptionId,
        role_name: &str,
        access_token: &str,
    ) -> Result<Option<String>, ArmError> {
        (**self)
            .find_role_definition_id(subscription_id, role_name, access_token)
            .await
    }

    async fn create_role_assignment(
        &self,
        subscription_id: SubscriptionId,
        role_definition_id: &str,
        principal_object_id: &str,
        access_token: &str,
    ) -> Result<String, ArmError> {
        (**self)
            .create_role_assignment(
                subscription_id,
                role_definition_id,
                principal_object_id,
                access_token,
            )
            .await
    }

    async fn role_assignments_for_principal(
        &self,
        subscription_id: SubscriptionId,
        principal_object_id: &str,
        access_token: &str,
    ) -> Result<Vec<RoleAssignment>, ArmError> {
        (**self)
            .role_assignments_for_principal(subscription_id, principal_object_id, access_token)
            .await
    }

    async fn delete_role_assignment(
        &self,
        assignment_path: &str,
        access_token: &str,
    ) -> Result<(), ArmError> {
        (**self)
            .delete_role_assignment(assignment_path, access_token)
            .await
    }
}

/// HTTP Resource Manager client.
#[derive(Debug, Clone)]
pub struct ResourceManagerClient {
    http: reqwest::Client,
    base_url: String,
    versions: ArmApiVersions,
}

impl ResourceManagerClient {
    /// The client must be constructed with a timeout; a hung management
    /// endpoint must not wedge the calling request.
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, versions: ArmApiVersions) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            versions,
        }
    }

    fn subscription_url(&self, subscription_id: SubscriptionId) -> String {
        format!("{}/subscriptions/{subscription_id}", self.base_url)
    }
}

#[async_trait]
impl ResourceManagerApi for ResourceManagerClient {
    async fn directory_for_subscription(
        &self,
        subscription_id: SubscriptionId,
    ) -> Result<DirectoryId, ArmError> {
        const OPERATION: &str = "subscription directory discovery";

        // Deliberately unauthenticated: the 401 challenge names the tenant.
        let response = self
            .http
            .get(self.subscription_url(subscription_id))
            .query(&[("api-version", self.versions.subscriptions.as_str())])
            .send()
            .await
            .map_err(|e| ArmError::Transport {
                operation: OPERATION,
                detail: e.to_string(),
            })?;

        if response.status().as_u16() != 401 {
            return Err(ArmError::DirectoryUndetermined {
                subscription_id: subscription_id.to_string(),
            });
        }

        response
            .headers()
            .get("WWW-Authenticate")
            .and_then(|v| v.to_str().ok())
            .and_then(directory_from_challenge)
            .ok_or_else(|| ArmError::DirectoryUndetermined {
                subscription_id: subscription_id.to_string(),
            })
    }

    async fn permissions_for_subscription(
        &self,
        subscription_id: SubscriptionId,
        access_token: &str,
    ) -> Result<Vec<PermissionGrant>, ArmError> {
        const OPERATION: &str = "permissions fetch";

        let url = format!(
            "{}/providers/microsoft.authorization/permissions",
            self.subscription_url(subscription_id)
        );
        let response = self
            .http
            .get(url)
            .query(&[("api-version", self.versions.permissions.as_str())])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport(OPERATION, e))?;
        let response = check_status(OPERATION, response)?;

        let envelope: ValueEnvelope<PermissionGrant> =
            response.json().await.map_err(|e| malformed(OPERATION, e))?;
        Ok(envelope.value)
    }

    async fn find_role_definition_id(
        &self,
        subscription_id: SubscriptionId,
        role_name: &str,
        access_token: &str,
    ) -> Result<Option<String>, ArmError> {
        const OPERATION: &str = "role definition lookup";

        let url = format!(
            "{}/providers/Microsoft.Authorization/roleDefinitions",
            self.subscription_url(subscription_id)
        );
        let response = self
            .http
            .get(url)
            .query(&[("api-version", self.versions.role_definitions.as_str())])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport(OPERATION, e))?;
        let response = check_status(OPERATION, response)?;

        let envelope: ValueEnvelope<RoleDefinition> =
            response.json().await.map_err(|e| malformed(OPERATION, e))?;
        Ok(envelope
            .value
            .into_iter()
            .find(|d| d.properties.role_name.eq_ignore_ascii_case(role_name))
            .map(|d| d.id))
    }

    async fn create_role_assignment(
        &self,
        subscription_id: SubscriptionId,
        role_definition_id: &str,
        principal_object_id: &str,
        access_token: &str,
    ) -> Result<String, ArmError> {
        const OPERATION: &str = "role assignment create";

        let assignment_id = Uuid::new_v4().to_string();
        let url = format!(
            "{}/providers/microsoft.authorization/roleassignments/{assignment_id}",
            self.subscription_url(subscription_id)
        );
        let body = serde_json::json!({
            "properties": {
                "roleDefinitionId": role_definition_id,
                "principalId": principal_object_id,
            }
        });

        let response = self
            .http
            .put(url)
            .query(&[("api-version", self.versions.role_assignments.as_str())])
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport(OPERATION, e))?;
        check_status(OPERATION, response)?;

        tracing::info!(subscription = %subscription_id, principal = principal_object_id, "role assignment created");
        Ok(assignment_id)
    }

    async fn role_assignments_for_principal(
        &self,
        subscription_id: SubscriptionId,
        principal_object_id: &str,
        access_token: &str,
    ) -> Result<Vec<RoleAssignment>, ArmError> {
        const OPERATION: &str = "role assignment list";

        let url = format!(
            "{}/providers/microsoft.authorization/roleassignments",
            self.subscription_url(subscription_id)
        );
        let filter = format!("principalId eq '{principal_object_id}'");
        let response = self
            .http
            .get(url)
            .query(&[
                ("api-version", self.versions.role_assignments.as_str()),
                ("$filter", filter.as_str()),
            ])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport(OPERATION, e))?;
        let response = check_status(OPERATION, response)?;

        let envelope: ValueEnvelope<RoleAssignment> =
            response.json().await.map_err(|e| malformed(OPERATION, e))?;
        Ok(envelope.value)
    }

    async fn delete_role_assignment(
        &self,
        assignment_path: &str,
        access_token: &str,
    ) -> Result<(), ArmError> {
        const OPERATION: &str = "role assignment delete";

        let url = format!("{}{assignment_path}", self.base_url);
        let response = self
            .http
            .delete(url)
            .query(&[("api-version", self.versions.role_assignments.as_str())])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport(OPERATION, e))?;
        check_status(OPERATION, response)?;
        Ok(())
    }
}

/// Extract the owning directory id from a `WWW-Authenticate` challenge,
/// e.g. `Bearer authorization_uri="https://login.windows.net/{guid}", ...`.
pub fn directory_from_challenge(header: &str) -> Option<DirectoryId> {
    let first_parameter = header.split(',').next()?;
    let (_, value) = first_parameter.split_once('=')?;
    let uri = value.trim().trim_matches('"');
    let segment = uri.trim_end_matches('/').rsplit('/').next()?;
    // The segment is the 36-character directory GUID.
    DirectoryId::from_str(segment.get(..36)?).ok()
}

pub(crate) fn transport(operation: &'static str, error: reqwest::Error) -> ArmError {
    ArmError::Transport {
        operation,
        detail: error.to_string(),
    }
}

pub(crate) fn malformed(operation: &'static str, error: reqwest::Error) -> ArmError {
    ArmError::Malformed {
        operation,
        detail: error.to_string(),
    }
}

pub(crate) fn check_status(
    operation: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ArmError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        tracing::warn!(operation, status = status.as_u16(), "upstream API error");
        Err(ArmError::Upstream {
            operation,
            status: status.as_u16(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_header_yields_directory_guid() {
        let header = r#"Bearer authorization_uri="https://login.windows.net/f5cbbf24-6fa8-4b64-9a02-7d105d106d63", error="invalid_token", error_description="The access token is missing.""#;
        let directory = directory_from_challenge(header).unwrap();
        assert_eq!(directory.to_string(), "f5cbbf24-6fa8-4b64-9a02-7d105d106d63");
    }

    #[test]
    fn challenge_with_trailing_slash_still_parses() {
        let header = r#"Bearer authorization_uri="https://login.windows.net/f5cbbf24-6fa8-4b64-9a02-7d105d106d63/""#;
        let directory = directory_from_challenge(header).unwrap();
        assert_eq!(directory.to_string(), "f5cbbf24-6fa8-4b64-9a02-7d105d106d63");
    }

    #[test]
    fn malformed_challenge_yields_none() {
        assert!(directory_from_challenge("Bearer realm=none").is_none());
        assert!(directory_from_challenge("").is_none());
        assert!(
            directory_from_challenge(r#"Bearer authorization_uri="https://login.windows.net/short""#)
                .is_none()
        );
    }
}

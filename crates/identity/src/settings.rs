//! Azure AD / Resource Manager settings.

use std::time::Duration;

use serde::Deserialize;

use cloudgate_core::DirectoryId;

use crate::error::IdentityError;

/// Placeholder substituted with a directory id (or `common`) in the
/// authority template.
const DIRECTORY_PLACEHOLDER: &str = "{directory}";

/// Process configuration for the identity and resource-manager integration.
///
/// Loaded from the environment (`CLOUDGATE_*`); everything except the client
/// credentials has a working default against public Azure endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct AzureAdSettings {
    /// Application (client) id of the confidential client.
    pub client_id: String,

    /// Client secret of the confidential client.
    pub client_secret: String,

    /// Redirect URI registered for the application.
    pub redirect_uri: String,

    /// Authority template; `{directory}` is replaced per tenant.
    pub authority_template: String,

    /// Audience identifier of the resource-management API.
    pub resource_manager_identifier: String,

    /// Base URL of the resource-management API.
    pub resource_manager_url: String,

    /// Audience identifier (and base URL) of the directory graph API.
    pub graph_api_identifier: String,

    /// Directory graph API version.
    pub graph_api_version: String,

    /// Role granted to the service principal on connected subscriptions.
    pub required_arm_role: String,

    /// Issued tokens must carry an issuer starting with this prefix.
    pub trusted_issuer_prefix: String,

    /// ARM api-version for the permissions endpoint.
    pub permissions_api_version: String,

    /// ARM api-version for the role-assignments endpoint.
    pub role_assignments_api_version: String,

    /// ARM api-version for the role-definitions endpoint.
    pub role_definitions_api_version: String,

    /// Timeout applied to every outbound identity/ARM call.
    pub http_timeout_secs: u64,
}

impl AzureAdSettings {
    /// Load settings from `CLOUDGATE_*` environment variables.
    ///
    /// `CLOUDGATE_CLIENT_ID` and `CLOUDGATE_CLIENT_SECRET` are required;
    /// everything else falls back to public-cloud defaults.
    pub fn from_env() -> Result<Self, IdentityError> {
        Ok(Self {
            client_id: require_env("CLOUDGATE_CLIENT_ID")?,
            client_secret: require_env("CLOUDGATE_CLIENT_SECRET")?,
            redirect_uri: env_or("CLOUDGATE_REDIRECT_URI", "http://localhost:8080/auth/callback"),
            authority_template: env_or(
                "CLOUDGATE_AUTHORITY_TEMPLATE",
                "https://login.windows.net/{directory}/",
            ),
            resource_manager_identifier: env_or(
                "CLOUDGATE_RESOURCE_MANAGER_IDENTIFIER",
                "https://management.core.windows.net/",
            ),
            resource_manager_url: env_or(
                "CLOUDGATE_RESOURCE_MANAGER_URL",
                "https://management.azure.com",
            ),
            graph_api_identifier: env_or(
                "CLOUDGATE_GRAPH_API_IDENTIFIER",
                "https://graph.windows.net/",
            ),
            graph_api_version: env_or("CLOUDGATE_GRAPH_API_VERSION", "1.6"),
            required_arm_role: env_or("CLOUDGATE_REQUIRED_ARM_ROLE", "Contributor"),
            trusted_issuer_prefix: env_or(
                "CLOUDGATE_TRUSTED_ISSUER_PREFIX",
                "https://sts.windows.net/",
            ),
            permissions_api_version: env_or(
                "CLOUDGATE_PERMISSIONS_API_VERSION",
                "2014-07-01-preview",
            ),
            role_assignments_api_version: env_or(
                "CLOUDGATE_ROLE_ASSIGNMENTS_API_VERSION",
                "2014-10-01-preview",
            ),
            role_definitions_api_version: env_or(
                "CLOUDGATE_ROLE_DEFINITIONS_API_VERSION",
                "2014-07-01-preview",
            ),
            http_timeout_secs: env_or("CLOUDGATE_HTTP_TIMEOUT_SECS", "30")
                .parse()
                .map_err(|e| {
                    IdentityError::Configuration(format!("CLOUDGATE_HTTP_TIMEOUT_SECS: {e}"))
                })?,
        })
    }

    /// Authority URL for a specific directory.
    pub fn authority_for_directory(&self, directory: &DirectoryId) -> String {
        self.authority_template
            .replace(DIRECTORY_PLACEHOLDER, &directory.to_string())
    }

    /// The default multi-tenant ("common") authority used before the owning
    /// tenant of a subscription is known.
    pub fn common_authority(&self) -> String {
        self.authority_template.replace(DIRECTORY_PLACEHOLDER, "common")
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn require_env(name: &str) -> Result<String, IdentityError> {
    std::env::var(name)
        .map_err(|_| IdentityError::Configuration(format!("{name} is not set")))
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

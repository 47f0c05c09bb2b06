//! Minimal wire shapes consumed from the resource-management and directory
//! APIs. All list endpoints wrap their payload in `{"value": [...]}`.

use serde::Deserialize;

/// Generic `{"value": [...]}` list envelope.
#[derive(Debug, Deserialize)]
pub struct ValueEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
}

/// One role definition, e.g. the built-in `Contributor` role.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleDefinition {
    /// Full ARM path of the definition.
    pub id: String,
    pub properties: RoleDefinitionProperties,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleDefinitionProperties {
    pub role_name: String,
}

/// One role assignment; `id` is the full ARM path used for deletion.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleAssignment {
    pub id: String,
}

/// A service principal in a directory.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePrincipal {
    pub object_id: String,
    #[serde(default)]
    pub app_id: Option<String>,
}

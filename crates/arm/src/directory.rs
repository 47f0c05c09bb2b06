//! Directory graph API client (service principal lookup).

use std::sync::Arc;

use async_trait::async_trait;

use cloudgate_core::DirectoryId;

use crate::client::{check_status, malformed, transport};
use crate::error::ArmError;
use crate::models::{ServicePrincipal, ValueEnvelope};

/// The slice of the directory API the orchestrator consumes.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    /// Object id of the service principal registered for `app_id` in a
    /// directory, if any.
    async fn service_principal_object_id(
        &self,
        directory_id: DirectoryId,
        app_id: &str,
        access_token: &str,
    ) -> Result<Option<String>, ArmError>;
}

#[async_trait]
impl<D> DirectoryApi for Arc<D>
where
    D: DirectoryApi + ?Sized,
{
    async fn service_principal_object_id(
        &self,
        directory_id: DirectoryId,
        app_id: &str,
        access_token: &str,
    ) -> Result<Option<String>, ArmError> {
        (**self)
            .service_principal_object_id(directory_id, app_id, access_token)
            .await
    }
}

/// HTTP directory graph client.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    http: reqwest::Client,
    base_url: String,
    api_version: String,
}

impl DirectoryClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http,
            base_url,
            api_version: api_version.into(),
        }
    }
}

#[async_trait]
impl DirectoryApi for DirectoryClient {
    async fn service_principal_object_id(
        &self,
        directory_id: DirectoryId,
        app_id: &str,
        access_token: &str,
    ) -> Result<Option<String>, ArmError> {
        const OPERATION: &str = "service principal lookup";

        let url = format!("{}/{directory_id}/servicePrincipals", self.base_url);
        let filter = format!("appId eq '{app_id}'");
        let response = self
            .http
            .get(url)
            .query(&[
                ("api-version", self.api_version.as_str()),
                ("$filter", filter.as_str()),
            ])
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| transport(OPERATION, e))?;
        let response = check_status(OPERATION, response)?;

        let envelope: ValueEnvelope<ServicePrincipal> =
            response.json().await.map_err(|e| malformed(OPERATION, e))?;
        Ok(envelope.value.into_iter().next().map(|sp| sp.object_id))
    }
}

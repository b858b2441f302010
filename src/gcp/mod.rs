//! Google Cloud control-plane access.
//!
//! `ControlPlane` reads and writes the reconciled resources. `Resolver` turns
//! the human-readable names an operator knows (access policy title, agent and
//! webhook display names) into fully-qualified resource names. `GcpClient`
//! implements both over the public REST APIs.

mod client;
mod error;
pub mod model;

pub use client::GcpClient;
pub use error::{Result, UpstreamError};

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;

use model::{Agent, CloudFunction, IamPolicy, ServicePerimeter, Webhook, WebhookSummary};

// ============================================================================
// Identifiers
// ============================================================================

/// OAuth2 access token presented by the caller.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(..)")
    }
}

/// A Cloud Function addressed by project, region and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRef {
    pub project_id: String,
    pub region: String,
    pub name: String,
}

impl FunctionRef {
    /// `projects/{p}/locations/{r}/functions/{name}`
    pub fn resource_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/functions/{}",
            self.project_id, self.region, self.name
        )
    }

    /// Public HTTPS trigger of a first-generation function.
    pub fn trigger_uri(&self) -> String {
        format!(
            "https://{}-{}.cloudfunctions.net/{}",
            self.region, self.project_id, self.name
        )
    }
}

// ============================================================================
// Endpoints
// ============================================================================

/// Base URLs of the upstream APIs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub cloud_functions: String,
    pub access_context_manager: String,
    pub cloud_resource_manager: String,
    pub storage: String,
    /// Regional endpoint; `{region}` is substituted per request.
    pub dialogflow: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            cloud_functions: "https://cloudfunctions.googleapis.com".to_string(),
            access_context_manager: "https://accesscontextmanager.googleapis.com".to_string(),
            cloud_resource_manager: "https://cloudresourcemanager.googleapis.com".to_string(),
            storage: "https://storage.googleapis.com".to_string(),
            dialogflow: "https://{region}-dialogflow.googleapis.com".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every API at one base URL (emulators and tests).
    pub fn single(base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            cloud_functions: base_url.clone(),
            access_context_manager: base_url.clone(),
            cloud_resource_manager: base_url.clone(),
            storage: base_url.clone(),
            dialogflow: base_url,
        }
    }

    pub fn dialogflow_for(&self, region: &str) -> String {
        self.dialogflow.replace("{region}", region)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Reads and writes the resources whose settings are reconciled.
///
/// Every call is a single request: no retries, no caching.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn get_function_iam_policy(
        &self,
        token: &AccessToken,
        function: &FunctionRef,
    ) -> Result<IamPolicy>;

    async fn set_function_iam_policy(
        &self,
        token: &AccessToken,
        function: &FunctionRef,
        policy: &IamPolicy,
    ) -> Result<()>;

    async fn get_function(
        &self,
        token: &AccessToken,
        function: &FunctionRef,
    ) -> Result<CloudFunction>;

    /// Replace the whole function descriptor.
    async fn patch_function(
        &self,
        token: &AccessToken,
        function: &FunctionRef,
        descriptor: &CloudFunction,
    ) -> Result<()>;

    async fn get_service_perimeter(
        &self,
        token: &AccessToken,
        project_id: &str,
        perimeter_uri: &str,
    ) -> Result<ServicePerimeter>;

    /// Update only `status.restrictedServices` of the perimeter.
    async fn patch_service_perimeter(
        &self,
        token: &AccessToken,
        project_id: &str,
        perimeter_uri: &str,
        perimeter: &ServicePerimeter,
    ) -> Result<()>;

    /// Download an object's contents from Cloud Storage.
    async fn download_object(
        &self,
        token: &AccessToken,
        project_id: &str,
        bucket: &str,
        object: &str,
    ) -> Result<Vec<u8>>;

    /// Replace a Dialogflow CX webhook.
    async fn patch_webhook(
        &self,
        token: &AccessToken,
        project_id: &str,
        region: &str,
        webhook_name: &str,
        webhook: &Webhook,
    ) -> Result<()>;
}

/// Resolves operator-facing names to resource identifiers.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Find the `accessPolicies/{n}` governing the project's organization by title.
    ///
    /// Returns `Ok(None)` when no policy carries that title.
    async fn resolve_access_policy_name(
        &self,
        token: &AccessToken,
        project_id: &str,
        title: &str,
    ) -> Result<Option<String>>;

    /// Agents of the project in a region, keyed by display name.
    async fn resolve_agents(
        &self,
        token: &AccessToken,
        project_id: &str,
        region: &str,
    ) -> Result<HashMap<String, Agent>>;

    /// Webhooks of an agent, keyed by display name.
    async fn resolve_webhooks(
        &self,
        token: &AccessToken,
        project_id: &str,
        region: &str,
        agent_name: &str,
    ) -> Result<HashMap<String, WebhookSummary>>;

    /// URI of a perimeter inside an access policy.
    fn perimeter_uri(&self, access_policy_name: &str, perimeter_name: &str) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_ref_names() {
        let function = FunctionRef {
            project_id: "demo".to_string(),
            region: "us-central1".to_string(),
            name: "webhook".to_string(),
        };
        assert_eq!(
            function.resource_name(),
            "projects/demo/locations/us-central1/functions/webhook"
        );
        assert_eq!(
            function.trigger_uri(),
            "https://us-central1-demo.cloudfunctions.net/webhook"
        );
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new("ya29.secret");
        assert_eq!(format!("{token:?}"), "AccessToken(..)");
    }

    #[test]
    fn test_endpoints_dialogflow_region() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.dialogflow_for("europe-west1"),
            "https://europe-west1-dialogflow.googleapis.com"
        );
    }

    #[test]
    fn test_endpoints_single_trims_slash() {
        let endpoints = Endpoints::single("http://127.0.0.1:9000/");
        assert_eq!(endpoints.cloud_functions, "http://127.0.0.1:9000");
        assert_eq!(endpoints.dialogflow_for("us-central1"), "http://127.0.0.1:9000");
    }
}

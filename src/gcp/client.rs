//! REST implementation of `ControlPlane` and `Resolver`.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::error::{Result, UpstreamError};
use super::model::{
    Agent, AncestryResponse, CloudFunction, IamPolicy, ListAccessPoliciesResponse,
    ListAgentsResponse, ListWebhooksResponse, ServicePerimeter, Webhook, WebhookSummary,
};
use super::{AccessToken, ControlPlane, Endpoints, FunctionRef, Resolver};

/// Header naming the project billed for the request.
const USER_PROJECT_HEADER: &str = "x-goog-user-project";

/// Field mask used when updating a perimeter.
pub const RESTRICTED_SERVICES_MASK: &str = "status.restrictedServices";

/// Google Cloud REST client.
#[derive(Debug, Clone)]
pub struct GcpClient {
    http: Client,
    endpoints: Endpoints,
}

impl GcpClient {
    #[must_use]
    pub fn new(endpoints: Endpoints) -> Self {
        Self::with_client(Client::new(), endpoints)
    }

    #[must_use]
    pub fn with_client(http: Client, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    fn request(
        &self,
        method: Method,
        url: impl reqwest::IntoUrl,
        token: &AccessToken,
        project_id: &str,
    ) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(token.as_str())
            .header(USER_PROJECT_HEADER, project_id)
    }

    /// Send a request and turn any non-success status into `Rejected`.
    async fn send(&self, operation: &'static str, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| UpstreamError::transport(operation, e))?;

        let status = response.status();
        if status.is_success() {
            debug!(operation, status = status.as_u16(), "upstream call succeeded");
            return Ok(response);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        info!(operation, status = status.as_u16(), body = %body, "upstream API rejected request");

        Err(UpstreamError::Rejected {
            operation,
            status: status.as_u16(),
            content_type,
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        builder: RequestBuilder,
    ) -> Result<T> {
        let response = self.send(operation, builder).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::transport(operation, e))?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::decode(operation, e))
    }

    async fn organization_id(
        &self,
        token: &AccessToken,
        project_id: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}/v1/projects/{}:getAncestry",
            self.endpoints.cloud_resource_manager, project_id
        );
        let builder = self
            .request(Method::POST, url, token, project_id)
            .json(&serde_json::json!({}));
        let ancestry: AncestryResponse = self.send_json("getAncestry", builder).await?;

        Ok(ancestry
            .ancestor
            .into_iter()
            .find(|a| a.resource_id.kind == "organization")
            .map(|a| a.resource_id.id))
    }
}

#[async_trait]
impl ControlPlane for GcpClient {
    async fn get_function_iam_policy(
        &self,
        token: &AccessToken,
        function: &FunctionRef,
    ) -> Result<IamPolicy> {
        let url = format!(
            "{}/v2/{}:getIamPolicy",
            self.endpoints.cloud_functions,
            function.resource_name()
        );
        let builder = self.request(Method::GET, url, token, &function.project_id);
        self.send_json("getIamPolicy", builder).await
    }

    async fn set_function_iam_policy(
        &self,
        token: &AccessToken,
        function: &FunctionRef,
        policy: &IamPolicy,
    ) -> Result<()> {
        let url = format!(
            "{}/v1/{}:setIamPolicy",
            self.endpoints.cloud_functions,
            function.resource_name()
        );
        let builder = self
            .request(Method::POST, url, token, &function.project_id)
            .json(&serde_json::json!({ "policy": policy }));
        self.send("setIamPolicy", builder).await.map(drop)
    }

    async fn get_function(
        &self,
        token: &AccessToken,
        function: &FunctionRef,
    ) -> Result<CloudFunction> {
        let url = format!(
            "{}/v1/{}",
            self.endpoints.cloud_functions,
            function.resource_name()
        );
        let builder = self.request(Method::GET, url, token, &function.project_id);
        self.send_json("getFunction", builder).await
    }

    async fn patch_function(
        &self,
        token: &AccessToken,
        function: &FunctionRef,
        descriptor: &CloudFunction,
    ) -> Result<()> {
        let url = format!(
            "{}/v1/{}",
            self.endpoints.cloud_functions,
            function.resource_name()
        );
        let builder = self
            .request(Method::PATCH, url, token, &function.project_id)
            .json(descriptor);
        self.send("patchFunction", builder).await.map(drop)
    }

    async fn get_service_perimeter(
        &self,
        token: &AccessToken,
        project_id: &str,
        perimeter_uri: &str,
    ) -> Result<ServicePerimeter> {
        let builder = self.request(Method::GET, perimeter_uri, token, project_id);
        self.send_json("getServicePerimeter", builder).await
    }

    async fn patch_service_perimeter(
        &self,
        token: &AccessToken,
        project_id: &str,
        perimeter_uri: &str,
        perimeter: &ServicePerimeter,
    ) -> Result<()> {
        let builder = self
            .request(Method::PATCH, perimeter_uri, token, project_id)
            .query(&[("updateMask", RESTRICTED_SERVICES_MASK)])
            .json(perimeter);
        self.send("patchServicePerimeter", builder).await.map(drop)
    }

    async fn download_object(
        &self,
        token: &AccessToken,
        project_id: &str,
        bucket: &str,
        object: &str,
    ) -> Result<Vec<u8>> {
        let operation = "downloadObject";
        let mut url = Url::parse(&self.endpoints.storage)
            .map_err(|e| UpstreamError::endpoint(operation, e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| UpstreamError::endpoint(operation, "storage endpoint has no path"))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");

        let builder = self.request(Method::GET, url, token, project_id);
        let response = self.send(operation, builder).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::transport(operation, e))?;
        Ok(bytes.to_vec())
    }

    async fn patch_webhook(
        &self,
        token: &AccessToken,
        project_id: &str,
        region: &str,
        webhook_name: &str,
        webhook: &Webhook,
    ) -> Result<()> {
        let url = format!(
            "{}/v3/{}",
            self.endpoints.dialogflow_for(region),
            webhook_name
        );
        let builder = self
            .request(Method::PATCH, url, token, project_id)
            .json(webhook);
        self.send("patchWebhook", builder).await.map(drop)
    }
}

#[async_trait]
impl Resolver for GcpClient {
    async fn resolve_access_policy_name(
        &self,
        token: &AccessToken,
        project_id: &str,
        title: &str,
    ) -> Result<Option<String>> {
        let Some(organization) = self.organization_id(token, project_id).await? else {
            debug!(project_id, "project has no organization ancestor");
            return Ok(None);
        };

        let url = format!("{}/v1/accessPolicies", self.endpoints.access_context_manager);
        let parent = format!("organizations/{organization}");
        let builder = self
            .request(Method::GET, url, token, project_id)
            .query(&[("parent", parent.as_str())]);
        let listed: ListAccessPoliciesResponse =
            self.send_json("listAccessPolicies", builder).await?;

        Ok(listed
            .access_policies
            .into_iter()
            .find(|p| p.title == title)
            .map(|p| p.name))
    }

    async fn resolve_agents(
        &self,
        token: &AccessToken,
        project_id: &str,
        region: &str,
    ) -> Result<HashMap<String, Agent>> {
        let url = format!(
            "{}/v3/projects/{}/locations/{}/agents",
            self.endpoints.dialogflow_for(region),
            project_id,
            region
        );
        let builder = self.request(Method::GET, url, token, project_id);
        let listed: ListAgentsResponse = self.send_json("listAgents", builder).await?;

        Ok(listed
            .agents
            .into_iter()
            .map(|a| (a.display_name.clone(), a))
            .collect())
    }

    async fn resolve_webhooks(
        &self,
        token: &AccessToken,
        project_id: &str,
        region: &str,
        agent_name: &str,
    ) -> Result<HashMap<String, WebhookSummary>> {
        let url = format!(
            "{}/v3/{}/webhooks",
            self.endpoints.dialogflow_for(region),
            agent_name
        );
        let builder = self.request(Method::GET, url, token, project_id);
        let listed: ListWebhooksResponse = self.send_json("listWebhooks", builder).await?;

        Ok(listed
            .webhooks
            .into_iter()
            .map(|w| (w.display_name.clone(), w))
            .collect())
    }

    fn perimeter_uri(&self, access_policy_name: &str, perimeter_name: &str) -> String {
        format!(
            "{}/v1/{}/servicePerimeters/{}",
            self.endpoints.access_context_manager, access_policy_name, perimeter_name
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

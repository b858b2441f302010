//! Common test utilities.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tokio::sync::Semaphore;
use tower::ServiceExt;

use perimeter_control::auth::BearerTokenSource;
use perimeter_control::gcp::model::{
    Agent, CloudFunction, IamPolicy, ServicePerimeter, Webhook, WebhookSummary,
};
use perimeter_control::gcp::{
    AccessToken, ControlPlane, FunctionRef, Resolver, Result, UpstreamError,
};
use perimeter_control::reconcile::FulfillmentSettings;
use perimeter_control::server::{self, AppState};

pub const TOKEN: &str = "ya29.test-token";
pub const AGENT_NAME: &str = "projects/demo/locations/us-central1/agents/a1";
pub const WEBHOOK_NAME: &str = "projects/demo/locations/us-central1/agents/a1/webhooks/w1";
pub const ACCESS_POLICY_TITLE: &str = "demo-policy";
pub const ACCESS_POLICY_NAME: &str = "accessPolicies/42";

/// A mutation the fake control plane accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    SetIamPolicy(IamPolicy),
    PatchFunction(CloudFunction),
    PatchPerimeter { uri: String, perimeter: ServicePerimeter },
    PatchWebhook { name: String, webhook: Webhook },
}

/// In-memory stand-in for the Google Cloud APIs.
///
/// Mutations are stored back so a following fetch sees them.
pub struct FakeCloud {
    pub policy: Mutex<IamPolicy>,
    pub function: Mutex<CloudFunction>,
    pub perimeter: Mutex<ServicePerimeter>,
    pub ca_cert: Vec<u8>,
    pub agents: Vec<Agent>,
    pub webhooks: Vec<WebhookSummary>,
    /// Operations that answer with the given status and JSON body.
    pub rejections: Mutex<HashMap<&'static str, (u16, String)>>,
    /// When set, `getIamPolicy` waits for a permit before answering.
    pub iam_read_gate: Option<Arc<Semaphore>>,
    /// Every operation called, in order, including rejected ones.
    pub calls: Mutex<Vec<&'static str>>,
    pub mutations: Mutex<Vec<Mutation>>,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self {
            policy: Mutex::new(IamPolicy::default()),
            function: Mutex::new(CloudFunction::default()),
            perimeter: Mutex::new(ServicePerimeter::default()),
            ca_cert: b"der-bytes".to_vec(),
            agents: vec![Agent {
                name: AGENT_NAME.to_string(),
                display_name: "Telecommunications".to_string(),
            }],
            webhooks: vec![WebhookSummary {
                name: WEBHOOK_NAME.to_string(),
                display_name: "cxPrebuiltAgentsTelecom".to_string(),
            }],
            rejections: Mutex::new(HashMap::new()),
            iam_read_gate: None,
            calls: Mutex::new(Vec::new()),
            mutations: Mutex::new(Vec::new()),
        }
    }
}

impl FakeCloud {
    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().unwrap().clone()
    }

    /// Make `operation` answer with `status` and `body` from now on.
    pub fn reject(&self, operation: &'static str, status: u16, body: &str) {
        self.rejections
            .lock()
            .unwrap()
            .insert(operation, (status, body.to_string()));
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn call(&self, operation: &'static str, token: &AccessToken) -> Result<()> {
        self.calls.lock().unwrap().push(operation);
        if token.as_str() != TOKEN {
            return Err(UpstreamError::Rejected {
                operation,
                status: 401,
                content_type: None,
                body: "invalid credentials".to_string(),
            });
        }
        match self.rejections.lock().unwrap().get(operation).cloned() {
            Some((status, body)) => Err(UpstreamError::Rejected {
                operation,
                status,
                content_type: Some("application/json".to_string()),
                body,
            }),
            None => Ok(()),
        }
    }

    fn record(&self, mutation: Mutation) {
        self.mutations.lock().unwrap().push(mutation);
    }
}

#[async_trait]
impl ControlPlane for FakeCloud {
    async fn get_function_iam_policy(
        &self,
        token: &AccessToken,
        _function: &FunctionRef,
    ) -> Result<IamPolicy> {
        self.call("getIamPolicy", token)?;
        if let Some(gate) = &self.iam_read_gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(self.policy.lock().unwrap().clone())
    }

    async fn set_function_iam_policy(
        &self,
        token: &AccessToken,
        _function: &FunctionRef,
        policy: &IamPolicy,
    ) -> Result<()> {
        self.call("setIamPolicy", token)?;
        *self.policy.lock().unwrap() = policy.clone();
        self.record(Mutation::SetIamPolicy(policy.clone()));
        Ok(())
    }

    async fn get_function(
        &self,
        token: &AccessToken,
        _function: &FunctionRef,
    ) -> Result<CloudFunction> {
        self.call("getFunction", token)?;
        Ok(self.function.lock().unwrap().clone())
    }

    async fn patch_function(
        &self,
        token: &AccessToken,
        _function: &FunctionRef,
        descriptor: &CloudFunction,
    ) -> Result<()> {
        self.call("patchFunction", token)?;
        *self.function.lock().unwrap() = descriptor.clone();
        self.record(Mutation::PatchFunction(descriptor.clone()));
        Ok(())
    }

    async fn get_service_perimeter(
        &self,
        token: &AccessToken,
        _project_id: &str,
        _perimeter_uri: &str,
    ) -> Result<ServicePerimeter> {
        self.call("getServicePerimeter", token)?;
        Ok(self.perimeter.lock().unwrap().clone())
    }

    async fn patch_service_perimeter(
        &self,
        token: &AccessToken,
        _project_id: &str,
        perimeter_uri: &str,
        perimeter: &ServicePerimeter,
    ) -> Result<()> {
        self.call("patchServicePerimeter", token)?;
        *self.perimeter.lock().unwrap() = perimeter.clone();
        self.record(Mutation::PatchPerimeter {
            uri: perimeter_uri.to_string(),
            perimeter: perimeter.clone(),
        });
        Ok(())
    }

    async fn download_object(
        &self,
        token: &AccessToken,
        _project_id: &str,
        bucket: &str,
        object: &str,
    ) -> Result<Vec<u8>> {
        self.call("downloadObject", token)?;
        if bucket == "demo-bucket" && object == "server.der" {
            return Ok(self.ca_cert.clone());
        }
        Err(UpstreamError::Rejected {
            operation: "downloadObject",
            status: 404,
            content_type: None,
            body: format!("No such object: {bucket}/{object}"),
        })
    }

    async fn patch_webhook(
        &self,
        token: &AccessToken,
        _project_id: &str,
        _region: &str,
        webhook_name: &str,
        webhook: &Webhook,
    ) -> Result<()> {
        self.call("patchWebhook", token)?;
        self.record(Mutation::PatchWebhook {
            name: webhook_name.to_string(),
            webhook: webhook.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl Resolver for FakeCloud {
    async fn resolve_access_policy_name(
        &self,
        token: &AccessToken,
        _project_id: &str,
        title: &str,
    ) -> Result<Option<String>> {
        self.call("listAccessPolicies", token)?;
        Ok((title == ACCESS_POLICY_TITLE).then(|| ACCESS_POLICY_NAME.to_string()))
    }

    async fn resolve_agents(
        &self,
        token: &AccessToken,
        _project_id: &str,
        _region: &str,
    ) -> Result<HashMap<String, Agent>> {
        self.call("listAgents", token)?;
        Ok(self
            .agents
            .iter()
            .map(|a| (a.display_name.clone(), a.clone()))
            .collect())
    }

    async fn resolve_webhooks(
        &self,
        token: &AccessToken,
        _project_id: &str,
        _region: &str,
        agent_name: &str,
    ) -> Result<HashMap<String, WebhookSummary>> {
        self.call("listWebhooks", token)?;
        if agent_name != AGENT_NAME {
            return Ok(HashMap::new());
        }
        Ok(self
            .webhooks
            .iter()
            .map(|w| (w.display_name.clone(), w.clone()))
            .collect())
    }

    fn perimeter_uri(&self, access_policy_name: &str, perimeter_name: &str) -> String {
        format!("fake://{access_policy_name}/servicePerimeters/{perimeter_name}")
    }
}

/// Create a test app backed by the given fake.
pub fn test_app(cloud: Arc<FakeCloud>) -> Router {
    test_app_with_limit(cloud, 16)
}

/// Create a test app allowing at most `max_connections` update requests at once.
pub fn test_app_with_limit(cloud: Arc<FakeCloud>, max_connections: usize) -> Router {
    let state = AppState {
        control_plane: cloud.clone(),
        resolver: cloud,
        tokens: Arc::new(BearerTokenSource),
        perimeter_name: "df_webhook".to_string(),
        fulfillment: Arc::new(FulfillmentSettings::default()),
    };
    server::build_app(state, 30, max_connections)
}

/// POST a `{"status": ...}` body with the test token.
pub fn update_request(uri: &str, status: bool) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {TOKEN}"))
        .header("content-type", "application/json")
        .body(Body::from(format!(r#"{{"status": {status}}}"#)))
        .unwrap()
}

/// Send a request and collect status and body.
pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

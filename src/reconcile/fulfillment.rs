//! How the conversational agent reaches its webhook.
//!
//! Unlike the other settings this one is not diffed against the live webhook:
//! the target representation is built from the desired mode alone and always
//! written.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use tracing::debug;

use super::{Evaluation, Reconcile, ReconcileError};
use crate::gcp::model::{Fulfillment, GenericWebService, ServiceDirectoryConfig, Webhook};
use crate::gcp::{AccessToken, ControlPlane, FunctionRef, Resolver};

// ============================================================================
// Settings
// ============================================================================

/// Names of the agent, webhook and private service the fulfillment points at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FulfillmentSettings {
    /// Display name of the Dialogflow CX agent.
    pub agent_display_name: String,
    /// Display name of the webhook inside the agent.
    pub webhook_display_name: String,
    /// Host name the private endpoint's certificate is issued for.
    pub internal_domain: String,
    pub service_directory_namespace: String,
    pub service_directory_service: String,
    /// Object in the caller's bucket holding the DER-encoded server certificate.
    pub ca_cert_object: String,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            agent_display_name: "Telecommunications".to_string(),
            webhook_display_name: "cxPrebuiltAgentsTelecom".to_string(),
            internal_domain: "webhook.internal".to_string(),
            service_directory_namespace: "df-namespace".to_string(),
            service_directory_service: "df-service".to_string(),
            ca_cert_object: "server.der".to_string(),
        }
    }
}

impl FulfillmentSettings {
    /// `projects/{p}/locations/{r}/namespaces/{ns}/services/{svc}`
    pub fn service_name(&self, project_id: &str, region: &str) -> String {
        format!(
            "projects/{}/locations/{}/namespaces/{}/services/{}",
            project_id, region, self.service_directory_namespace, self.service_directory_service
        )
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// Requested fulfillment path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FulfillmentMode {
    GenericWebService,
    ServiceDirectory,
}

impl FulfillmentMode {
    pub fn from_service_directory(enabled: bool) -> Self {
        if enabled {
            Self::ServiceDirectory
        } else {
            Self::GenericWebService
        }
    }
}

/// Everything fetched before the webhook body can be built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentTarget {
    GenericWebService,
    ServiceDirectory { ca_cert: Vec<u8> },
}

/// A webhook body together with the webhook it replaces.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookUpdate {
    /// Fully-qualified webhook resource name.
    pub name: String,
    pub webhook: Webhook,
}

/// Build the webhook body for a target.
pub fn build_fulfillment(
    target: &FulfillmentTarget,
    function: &FunctionRef,
    settings: &FulfillmentSettings,
) -> Webhook {
    let fulfillment = match target {
        FulfillmentTarget::GenericWebService => Fulfillment::GenericWebService(GenericWebService {
            uri: function.trigger_uri(),
            allowed_ca_certs: Vec::new(),
        }),
        FulfillmentTarget::ServiceDirectory { ca_cert } => {
            Fulfillment::ServiceDirectory(ServiceDirectoryConfig {
                service: settings.service_name(&function.project_id, &function.region),
                generic_web_service: GenericWebService {
                    uri: format!("https://{}", settings.internal_domain),
                    allowed_ca_certs: vec![STANDARD.encode(ca_cert)],
                },
            })
        }
    };

    Webhook {
        display_name: settings.webhook_display_name.clone(),
        fulfillment,
    }
}

// ============================================================================
// Reconcile
// ============================================================================

/// Points the agent's webhook at the public trigger or the private service.
pub struct WebhookFulfillment<'a> {
    pub plane: &'a dyn ControlPlane,
    pub resolver: &'a dyn Resolver,
    pub token: &'a AccessToken,
    /// The webhook function; its name builds the public trigger URI.
    pub function: &'a FunctionRef,
    /// Bucket holding the private endpoint's certificate.
    pub bucket: &'a str,
    pub settings: &'a FulfillmentSettings,
    pub mode: FulfillmentMode,
}

impl WebhookFulfillment<'_> {
    async fn webhook_name(&self) -> Result<String, ReconcileError> {
        let project_id = &self.function.project_id;
        let region = &self.function.region;

        let agents = self
            .resolver
            .resolve_agents(self.token, project_id, region)
            .await?;
        let agent = agents.get(&self.settings.agent_display_name).ok_or_else(|| {
            ReconcileError::internal(format!(
                "agent '{}' not found in {project_id}/{region}",
                self.settings.agent_display_name
            ))
        })?;

        let webhooks = self
            .resolver
            .resolve_webhooks(self.token, project_id, region, &agent.name)
            .await?;
        let webhook = webhooks
            .get(&self.settings.webhook_display_name)
            .ok_or_else(|| {
                ReconcileError::internal(format!(
                    "webhook '{}' not found in agent '{}'",
                    self.settings.webhook_display_name, agent.name
                ))
            })?;

        Ok(webhook.name.clone())
    }
}

#[async_trait]
impl Reconcile for WebhookFulfillment<'_> {
    type Current = (String, FulfillmentTarget);
    type Desired = WebhookUpdate;

    fn name(&self) -> &'static str {
        "webhook_fulfillment"
    }

    async fn fetch(&self) -> Result<(String, FulfillmentTarget), ReconcileError> {
        let name = self.webhook_name().await?;
        let target = match self.mode {
            FulfillmentMode::GenericWebService => FulfillmentTarget::GenericWebService,
            FulfillmentMode::ServiceDirectory => {
                let ca_cert = self
                    .plane
                    .download_object(
                        self.token,
                        &self.function.project_id,
                        self.bucket,
                        &self.settings.ca_cert_object,
                    )
                    .await?;
                debug!(bytes = ca_cert.len(), "downloaded CA certificate");
                FulfillmentTarget::ServiceDirectory { ca_cert }
            }
        };
        Ok((name, target))
    }

    fn evaluate(&self, (name, target): (String, FulfillmentTarget)) -> Evaluation<WebhookUpdate> {
        Evaluation::Changed(WebhookUpdate {
            name,
            webhook: build_fulfillment(&target, self.function, self.settings),
        })
    }

    async fn apply(&self, desired: WebhookUpdate) -> Result<(), ReconcileError> {
        Ok(self
            .plane
            .patch_webhook(
                self.token,
                &self.function.project_id,
                &self.function.region,
                &desired.name,
                &desired.webhook,
            )
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn function() -> FunctionRef {
        FunctionRef {
            project_id: "demo".to_string(),
            region: "us-central1".to_string(),
            name: "webhook".to_string(),
        }
    }

    #[test]
    fn test_generic_web_service_points_at_trigger() {
        let webhook = build_fulfillment(
            &FulfillmentTarget::GenericWebService,
            &function(),
            &FulfillmentSettings::default(),
        );
        assert_eq!(
            serde_json::to_value(&webhook).unwrap(),
            json!({
                "displayName": "cxPrebuiltAgentsTelecom",
                "genericWebService": {"uri": "https://us-central1-demo.cloudfunctions.net/webhook"}
            })
        );
    }

    #[test]
    fn test_service_directory_embeds_certificate() {
        let target = FulfillmentTarget::ServiceDirectory {
            ca_cert: b"cert-bytes".to_vec(),
        };
        let webhook = build_fulfillment(&target, &function(), &FulfillmentSettings::default());
        assert_eq!(
            serde_json::to_value(&webhook).unwrap(),
            json!({
                "displayName": "cxPrebuiltAgentsTelecom",
                "serviceDirectory": {
                    "service": "projects/demo/locations/us-central1/namespaces/df-namespace/services/df-service",
                    "genericWebService": {
                        "uri": "https://webhook.internal",
                        "allowedCaCerts": ["Y2VydC1ieXRlcw=="]
                    }
                }
            })
        );
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(
            FulfillmentMode::from_service_directory(true),
            FulfillmentMode::ServiceDirectory
        );
        assert_eq!(
            FulfillmentMode::from_service_directory(false),
            FulfillmentMode::GenericWebService
        );
    }
}

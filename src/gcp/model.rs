//! Wire representations of the remote resources this service reconciles.
//!
//! Only the fields that are read or edited are typed. Everything else is kept
//! in an `extra` map and written back unchanged, since the functions and
//! webhook APIs replace the whole object on update.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// IAM role granting permission to call a Cloud Function.
pub const INVOKER_ROLE: &str = "roles/cloudfunctions.invoker";

/// IAM member standing for unauthenticated public access.
pub const ALL_USERS: &str = "allUsers";

// ============================================================================
// IAM
// ============================================================================

/// IAM policy attached to a Cloud Function.
///
/// A missing `bindings` key is the same as an empty list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IamPolicy {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bindings: Vec<Binding>,
    /// `etag`, `version`, `auditConfigs`, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Role-to-members mapping within a policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub role: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Binding {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            members: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn has_member(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }
}

impl IamPolicy {
    /// Whether `allUsers` holds the invoker role in any binding.
    pub fn is_publicly_invokable(&self) -> bool {
        self.bindings
            .iter()
            .any(|b| b.role == INVOKER_ROLE && b.has_member(ALL_USERS))
    }
}

// ============================================================================
// Cloud Functions
// ============================================================================

/// Network ingress setting of a Cloud Function.
///
/// Values this service does not know are kept as sent, so they survive a
/// read-modify-write of the descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum IngressSettings {
    IngressSettingsUnspecified,
    AllowAll,
    AllowInternalOnly,
    AllowInternalAndGclb,
    Other(String),
}

impl From<String> for IngressSettings {
    fn from(value: String) -> Self {
        match value.as_str() {
            "INGRESS_SETTINGS_UNSPECIFIED" => Self::IngressSettingsUnspecified,
            "ALLOW_ALL" => Self::AllowAll,
            "ALLOW_INTERNAL_ONLY" => Self::AllowInternalOnly,
            "ALLOW_INTERNAL_AND_GCLB" => Self::AllowInternalAndGclb,
            _ => Self::Other(value),
        }
    }
}

impl From<IngressSettings> for String {
    fn from(value: IngressSettings) -> Self {
        match value {
            IngressSettings::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl IngressSettings {
    pub fn as_str(&self) -> &str {
        match self {
            Self::IngressSettingsUnspecified => "INGRESS_SETTINGS_UNSPECIFIED",
            Self::AllowAll => "ALLOW_ALL",
            Self::AllowInternalOnly => "ALLOW_INTERNAL_ONLY",
            Self::AllowInternalAndGclb => "ALLOW_INTERNAL_AND_GCLB",
            Self::Other(raw) => raw,
        }
    }

    /// Map the caller's `internal_only` flag to a setting.
    pub fn from_internal_only(internal_only: bool) -> Self {
        if internal_only {
            Self::AllowInternalOnly
        } else {
            Self::AllowAll
        }
    }
}

/// Cloud Function descriptor as returned by `GET .../functions/{name}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_settings: Option<IngressSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ============================================================================
// Access Context Manager
// ============================================================================

/// Service perimeter descriptor.
///
/// Missing `status` and missing `restrictedServices` both mean "nothing restricted".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePerimeter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PerimeterConfig>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Enforced configuration of a perimeter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerimeterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restricted_services: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ServicePerimeter {
    /// Services currently restricted by the perimeter.
    pub fn restricted_services(&self) -> &[String] {
        self.status
            .as_ref()
            .and_then(|s| s.restricted_services.as_deref())
            .unwrap_or_default()
    }

    pub fn restricts(&self, api: &str) -> bool {
        self.restricted_services().iter().any(|s| s == api)
    }
}

/// Access policy summary from `GET /v1/accessPolicies`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessPolicy {
    /// `accessPolicies/{number}`
    pub name: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListAccessPoliciesResponse {
    #[serde(default)]
    pub access_policies: Vec<AccessPolicy>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AncestryResponse {
    #[serde(default)]
    pub ancestor: Vec<Ancestor>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Ancestor {
    pub resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResourceId {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
}

// ============================================================================
// Dialogflow CX
// ============================================================================

/// Dialogflow CX agent summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// `projects/{p}/locations/{r}/agents/{id}`
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListAgentsResponse {
    #[serde(default)]
    pub agents: Vec<Agent>,
}

/// Dialogflow CX webhook summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookSummary {
    /// `projects/{p}/locations/{r}/agents/{id}/webhooks/{id}`
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListWebhooksResponse {
    #[serde(default)]
    pub webhooks: Vec<WebhookSummary>,
}

/// Webhook body sent on `PATCH .../webhooks/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub display_name: String,
    #[serde(flatten)]
    pub fulfillment: Fulfillment,
}

/// How the agent reaches its webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Fulfillment {
    /// Direct call to the public function trigger.
    GenericWebService(GenericWebService),
    /// Call routed through a Service Directory service on the private network.
    ServiceDirectory(ServiceDirectoryConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericWebService {
    pub uri: String,
    /// Base64-encoded DER certificates trusted for the endpoint.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub allowed_ca_certs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDirectoryConfig {
    pub service: String,
    pub generic_web_service: GenericWebService,
}

// ============================================================================
// Tests
// ============================================================================

//! Setting update handlers.
//!
//! Each route reconciles one remote setting against the boolean `status` in
//! the request body and answers `200` with an empty body once the remote
//! resource is in the requested state.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, error, info, info_span, warn};
use ulid::Ulid;

use crate::gcp::{AccessToken, FunctionRef, UpstreamError};
use crate::handlers::problem_details;
use crate::reconcile::{
    BlockReason, CLOUD_FUNCTIONS_API, DIALOGFLOW_API, FulfillmentMode, Outcome,
    PerimeterRestriction, ReconcileError, WebhookAccess, WebhookFulfillment, WebhookIngress,
    reconcile,
};
use crate::server::AppState;

// ============================================================================
// Request Types
// ============================================================================

/// Body shared by every update route.
///
/// Read only after the token and `project_id` checks, so a request without a
/// project is reported as blocked whatever its body holds.
#[derive(Debug, Deserialize)]
struct StatusRequest {
    status: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookQuery {
    project_id: Option<String>,
    region: Option<String>,
    webhook_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PerimeterQuery {
    project_id: Option<String>,
    access_policy_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FulfillmentQuery {
    project_id: Option<String>,
    bucket: Option<String>,
    region: Option<String>,
    webhook_name: Option<String>,
}

/// Soft failure reported with `200` so the UI can tell "not configured yet"
/// apart from a failed operation.
#[derive(Debug, Serialize)]
pub struct BlockedResponse {
    status: &'static str,
    reason: BlockReason,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /update_webhook_access
pub async fn update_webhook_access(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Response {
    let span = request_span("update_webhook_access");
    async move {
        let token = match state.tokens.access_token(&headers).await {
            Ok(token) => token,
            Err(response) => return response,
        };
        let Some(project_id) = present(query.project_id) else {
            return blocked(BlockReason::NoProjectId);
        };
        let req = match status_request(&body) {
            Ok(req) => req,
            Err(response) => return response,
        };
        let function = match function_ref(project_id, query.region, query.webhook_name) {
            Ok(function) => function,
            Err(response) => return response,
        };
        info!(
            internal_only = req.status,
            function = %function.resource_name(),
            "updating webhook access"
        );

        let setting = WebhookAccess {
            plane: state.control_plane.as_ref(),
            token: &token,
            function: &function,
            internal_only: req.status,
        };
        respond(reconcile(&setting).await)
    }
    .instrument(span)
    .await
}

/// POST /update_webhook_ingress
pub async fn update_webhook_ingress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WebhookQuery>,
    body: Bytes,
) -> Response {
    let span = request_span("update_webhook_ingress");
    async move {
        let token = match state.tokens.access_token(&headers).await {
            Ok(token) => token,
            Err(response) => return response,
        };
        let Some(project_id) = present(query.project_id) else {
            return blocked(BlockReason::NoProjectId);
        };
        let req = match status_request(&body) {
            Ok(req) => req,
            Err(response) => return response,
        };
        let function = match function_ref(project_id, query.region, query.webhook_name) {
            Ok(function) => function,
            Err(response) => return response,
        };
        info!(
            internal_only = req.status,
            function = %function.resource_name(),
            "updating webhook ingress"
        );

        let setting = WebhookIngress {
            plane: state.control_plane.as_ref(),
            token: &token,
            function: &function,
            internal_only: req.status,
        };
        respond(reconcile(&setting).await)
    }
    .instrument(span)
    .await
}

/// POST /update_security_perimeter_cloudfunctions
pub async fn update_security_perimeter_cloudfunctions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PerimeterQuery>,
    body: Bytes,
) -> Response {
    let span = request_span("update_security_perimeter_cloudfunctions");
    update_security_perimeter(state, headers, query, body, CLOUD_FUNCTIONS_API)
        .instrument(span)
        .await
}

/// POST /update_security_perimeter_dialogflow
pub async fn update_security_perimeter_dialogflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PerimeterQuery>,
    body: Bytes,
) -> Response {
    let span = request_span("update_security_perimeter_dialogflow");
    update_security_perimeter(state, headers, query, body, DIALOGFLOW_API)
        .instrument(span)
        .await
}

/// POST /update_service_directory_webhook_fulfillment
pub async fn update_service_directory_webhook_fulfillment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FulfillmentQuery>,
    body: Bytes,
) -> Response {
    let span = request_span("update_service_directory_webhook_fulfillment");
    async move {
        let token = match state.tokens.access_token(&headers).await {
            Ok(token) => token,
            Err(response) => return response,
        };
        let Some(project_id) = present(query.project_id) else {
            return blocked(BlockReason::NoProjectId);
        };
        let req = match status_request(&body) {
            Ok(req) => req,
            Err(response) => return response,
        };
        let bucket = match required(query.bucket, "bucket") {
            Ok(bucket) => bucket,
            Err(response) => return response,
        };
        let function = match function_ref(project_id, query.region, query.webhook_name) {
            Ok(function) => function,
            Err(response) => return response,
        };
        let mode = FulfillmentMode::from_service_directory(req.status);
        info!(?mode, function = %function.resource_name(), "updating webhook fulfillment");

        let setting = WebhookFulfillment {
            plane: state.control_plane.as_ref(),
            resolver: state.resolver.as_ref(),
            token: &token,
            function: &function,
            bucket: &bucket,
            settings: &state.fulfillment,
            mode,
        };
        respond(reconcile(&setting).await)
    }
    .instrument(span)
    .await
}

// ============================================================================
// Private Helpers
// ============================================================================

async fn update_security_perimeter(
    state: AppState,
    headers: HeaderMap,
    query: PerimeterQuery,
    body: Bytes,
    api: &'static str,
) -> Response {
    let token = match state.tokens.access_token(&headers).await {
        Ok(token) => token,
        Err(response) => return response,
    };
    let Some(project_id) = present(query.project_id) else {
        return blocked(BlockReason::NoProjectId);
    };
    let restrict = match status_request(&body) {
        Ok(req) => req.status,
        Err(response) => return response,
    };
    let title = match required(query.access_policy_title, "access_policy_title") {
        Ok(title) => title,
        Err(response) => return response,
    };
    info!(api, restrict, project_id = %project_id, "updating security perimeter");

    let perimeter_uri = match perimeter_uri(&state, &token, &project_id, &title).await {
        Ok(Some(uri)) => uri,
        Ok(None) => {
            warn!(title = %title, "access policy not found");
            return blocked(BlockReason::NoAccessPolicy);
        }
        Err(e) => return respond(Err(e.into())),
    };

    let setting = PerimeterRestriction {
        plane: state.control_plane.as_ref(),
        token: &token,
        project_id: &project_id,
        perimeter_uri: &perimeter_uri,
        api,
        restrict,
    };
    respond(reconcile(&setting).await)
}

async fn perimeter_uri(
    state: &AppState,
    token: &AccessToken,
    project_id: &str,
    title: &str,
) -> Result<Option<String>, UpstreamError> {
    let name = state
        .resolver
        .resolve_access_policy_name(token, project_id, title)
        .await?;
    Ok(name.map(|name| state.resolver.perimeter_uri(&name, &state.perimeter_name)))
}

fn request_span(route: &'static str) -> tracing::Span {
    info_span!("request", route, request_id = %Ulid::new())
}

/// Treat an empty query value the same as a missing one.
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn required(value: Option<String>, name: &'static str) -> Result<String, Response> {
    present(value).ok_or_else(|| {
        problem_details::bad_request(format!("missing required query parameter '{name}'"))
            .into_response()
    })
}

fn status_request(body: &[u8]) -> Result<StatusRequest, Response> {
    serde_json::from_slice(body).map_err(|e| {
        problem_details::bad_request(format!("invalid request body: {e}")).into_response()
    })
}

fn function_ref(
    project_id: String,
    region: Option<String>,
    webhook_name: Option<String>,
) -> Result<FunctionRef, Response> {
    Ok(FunctionRef {
        project_id,
        region: required(region, "region")?,
        name: required(webhook_name, "webhook_name")?,
    })
}

fn blocked(reason: BlockReason) -> Response {
    info!(?reason, "request blocked");
    (
        StatusCode::OK,
        Json(BlockedResponse {
            status: "BLOCKED",
            reason,
        }),
    )
        .into_response()
}

fn respond(result: Result<Outcome, ReconcileError>) -> Response {
    match result {
        Ok(Outcome::Unchanged | Outcome::Applied) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

impl IntoResponse for ReconcileError {
    fn into_response(self) -> Response {
        match self {
            ReconcileError::Upstream(UpstreamError::Rejected {
                status,
                content_type,
                body,
                ..
            }) => {
                let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
                match content_type {
                    Some(content_type) => {
                        (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
                    }
                    None => (status, body).into_response(),
                }
            }
            ReconcileError::Upstream(e) => {
                error!(error = %e, "upstream call failed");
                problem_details::bad_gateway(e.to_string()).into_response()
            }
            ReconcileError::Internal(message) => {
                error!(error = %message, "unexpected remote state");
                (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
            }
        }
    }
}

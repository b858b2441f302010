use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::auth::TokenSource;
use crate::gcp::{ControlPlane, Resolver};
use crate::handlers;
use crate::reconcile::FulfillmentSettings;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
///
/// Holds collaborators only; every request fetches remote state afresh.
#[derive(Clone)]
pub struct AppState {
    pub control_plane: Arc<dyn ControlPlane>,
    pub resolver: Arc<dyn Resolver>,
    pub tokens: Arc<dyn TokenSource>,
    /// Perimeter edited by the perimeter routes.
    pub perimeter_name: String,
    pub fulfillment: Arc<FulfillmentSettings>,
}

// ============================================================================
// Server Setup
// ============================================================================

/// Build the router.
///
/// `max_connections` bounds the update requests in flight across all update
/// routes together. Health and version routes are not limited.
pub fn build_app(state: AppState, request_timeout_seconds: u64, max_connections: usize) -> Router {
    let update_routes = Router::new()
        .route(
            "/update_webhook_access",
            post(handlers::update_webhook_access),
        )
        .route(
            "/update_webhook_ingress",
            post(handlers::update_webhook_ingress),
        )
        .route(
            "/update_security_perimeter_cloudfunctions",
            post(handlers::update_security_perimeter_cloudfunctions),
        )
        .route(
            "/update_security_perimeter_dialogflow",
            post(handlers::update_security_perimeter_dialogflow),
        )
        .route(
            "/update_service_directory_webhook_fulfillment",
            post(handlers::update_service_directory_webhook_fulfillment),
        )
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ))
        .layer(GlobalConcurrencyLimitLayer::new(max_connections));

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .merge(update_routes)
}

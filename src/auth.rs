//! Caller credential extraction.
//!
//! Every update runs with the caller's own Google Cloud access token; this
//! service holds no credentials of its own.

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::{IntoResponse, Response};

use crate::gcp::AccessToken;
use crate::handlers::problem_details;

/// Resolves an incoming request to a bearer access token.
///
/// On failure the returned response is sent to the caller as-is.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self, headers: &HeaderMap) -> Result<AccessToken, Response>;
}

/// Reads the token from the request's `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerTokenSource;

#[async_trait]
impl TokenSource for BearerTokenSource {
    async fn access_token(&self, headers: &HeaderMap) -> Result<AccessToken, Response> {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(AccessToken::new)
            .ok_or_else(|| {
                problem_details::unauthorized("missing bearer access token").into_response()
            })
    }
}

//! Upstream control-plane error types.

use thiserror::Error;

/// Result type for control-plane calls.
pub type Result<T> = std::result::Result<T, UpstreamError>;

/// Errors returned by the Google Cloud control-plane APIs.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The API answered with a non-success status.
    ///
    /// The status and body are surfaced to the caller unchanged.
    #[error("{operation} rejected ({status}): {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        content_type: Option<String>,
        body: String,
    },

    /// The request never produced a response.
    #[error("{operation} request failed: {source}")]
    Transport {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with success but the body did not parse.
    #[error("{operation} returned an unreadable body: {source}")]
    Decode {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A configured endpoint could not be turned into a request URL.
    #[error("{operation} has an unusable endpoint: {message}")]
    Endpoint {
        operation: &'static str,
        message: String,
    },
}

impl UpstreamError {
    /// Create a transport error for the given operation.
    pub fn transport(operation: &'static str, source: reqwest::Error) -> Self {
        Self::Transport { operation, source }
    }

    /// Create a decode error for the given operation.
    pub fn decode(operation: &'static str, source: serde_json::Error) -> Self {
        Self::Decode { operation, source }
    }

    /// Create an endpoint error for the given operation.
    pub fn endpoint(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Endpoint {
            operation,
            message: message.into(),
        }
    }
}

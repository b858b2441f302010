//! Reconciliation error types.

use thiserror::Error;

use crate::gcp::UpstreamError;

/// Errors that end a reconciliation before it completes.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A control-plane call failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The remote state is not shaped the way this service expects.
    #[error("{0}")]
    Internal(String),
}

impl ReconcileError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

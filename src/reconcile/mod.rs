//! Idempotent reconciliation of remote settings.
//!
//! Every setting follows the same protocol: fetch the live representation,
//! evaluate it against the desired state, and apply a mutation only when the
//! evaluation asks for one. Nothing is cached between invocations.
//!
//! ```text
//! FETCHING -> EVALUATING -> Unchanged
//!                        -> APPLYING -> Applied
//! ```
//!
//! A failure in any phase ends the invocation with nothing applied.

mod access;
mod error;
mod fulfillment;
mod ingress;
mod perimeter;

pub use access::{WebhookAccess, evaluate_invoker_binding};
pub use error::ReconcileError;
pub use fulfillment::{
    FulfillmentMode, FulfillmentSettings, FulfillmentTarget, WebhookFulfillment,
    WebhookUpdate, build_fulfillment,
};
pub use ingress::{WebhookIngress, evaluate_ingress};
pub use perimeter::{
    CLOUD_FUNCTIONS_API, DIALOGFLOW_API, PerimeterRestriction, evaluate_perimeter,
};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

// ============================================================================
// Results
// ============================================================================

/// Result of evaluating a fetched representation against the desired state.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation<T> {
    /// The remote resource already matches; nothing to send.
    Unchanged,
    /// The representation to write back.
    Changed(T),
}

impl<T> Evaluation<T> {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, Evaluation::Unchanged)
    }
}

/// Caller-facing outcome of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Already in the desired state.
    Unchanged,
    /// A mutation was issued and accepted.
    Applied,
}

/// Why an update was refused before reconciliation started.
///
/// Reported to the caller as a soft failure, not as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockReason {
    NoProjectId,
    NoAccessPolicy,
}

// ============================================================================
// Reconcile
// ============================================================================

/// One reconcilable setting.
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Representation read from the control plane.
    type Current: Send;
    /// Representation written back when a change is needed.
    type Desired: Send;

    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn fetch(&self) -> Result<Self::Current, ReconcileError>;

    /// Decide whether a mutation is needed. Must not perform I/O.
    fn evaluate(&self, current: Self::Current) -> Evaluation<Self::Desired>;

    async fn apply(&self, desired: Self::Desired) -> Result<(), ReconcileError>;
}

/// Drive a setting through fetch, evaluate and (when needed) apply.
pub async fn reconcile<R: Reconcile + ?Sized>(setting: &R) -> Result<Outcome, ReconcileError> {
    let name = setting.name();

    debug!(setting = name, "fetching current state");
    let current = setting.fetch().await?;

    match setting.evaluate(current) {
        Evaluation::Unchanged => {
            info!(setting = name, "already in desired state; no change needed");
            Ok(Outcome::Unchanged)
        }
        Evaluation::Changed(desired) => {
            debug!(setting = name, "applying change");
            setting.apply(desired).await?;
            info!(setting = name, "change applied");
            Ok(Outcome::Applied)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcp::UpstreamError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter {
        current: i32,
        desired: i32,
        fail_fetch: bool,
        fail_apply: bool,
        applied: AtomicUsize,
    }

    impl Counter {
        fn new(current: i32, desired: i32) -> Self {
            Self {
                current,
                desired,
                fail_fetch: false,
                fail_apply: false,
                applied: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Reconcile for Counter {
        type Current = i32;
        type Desired = i32;

        fn name(&self) -> &'static str {
            "counter"
        }

        async fn fetch(&self) -> Result<i32, ReconcileError> {
            if self.fail_fetch {
                return Err(UpstreamError::Rejected {
                    operation: "getCounter",
                    status: 403,
                    content_type: None,
                    body: "denied".to_string(),
                }
                .into());
            }
            Ok(self.current)
        }

        fn evaluate(&self, current: i32) -> Evaluation<i32> {
            if current == self.desired {
                Evaluation::Unchanged
            } else {
                Evaluation::Changed(self.desired)
            }
        }

        async fn apply(&self, _desired: i32) -> Result<(), ReconcileError> {
            self.applied.fetch_add(1, Ordering::SeqCst);
            if self.fail_apply {
                return Err(UpstreamError::Rejected {
                    operation: "setCounter",
                    status: 409,
                    content_type: Some("application/json".to_string()),
                    body: r#"{"error":{"code":409}}"#.to_string(),
                }
                .into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_unchanged_skips_apply() {
        let setting = Counter::new(1, 1);
        let outcome = reconcile(&setting).await.unwrap();
        assert_eq!(outcome, Outcome::Unchanged);
        assert_eq!(setting.applied.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_changed_applies_once() {
        let setting = Counter::new(1, 2);
        let outcome = reconcile(&setting).await.unwrap();
        assert_eq!(outcome, Outcome::Applied);
        assert_eq!(setting.applied.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_short_circuits() {
        let mut setting = Counter::new(1, 2);
        setting.fail_fetch = true;
        let err = reconcile(&setting).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Upstream(UpstreamError::Rejected { status: 403, .. })
        ));
        assert_eq!(setting.applied.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_apply_failure_is_returned_unchanged() {
        let mut setting = Counter::new(1, 2);
        setting.fail_apply = true;
        match reconcile(&setting).await.unwrap_err() {
            ReconcileError::Upstream(UpstreamError::Rejected {
                operation,
                status,
                content_type,
                body,
            }) => {
                assert_eq!(operation, "setCounter");
                assert_eq!(status, 409);
                assert_eq!(content_type.as_deref(), Some("application/json"));
                assert_eq!(body, r#"{"error":{"code":409}}"#);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert_eq!(setting.applied.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_block_reason_serialization() {
        assert_eq!(
            serde_json::to_value(BlockReason::NoProjectId).unwrap(),
            serde_json::json!("NO_PROJECT_ID")
        );
        assert_eq!(
            serde_json::to_value(BlockReason::NoAccessPolicy).unwrap(),
            serde_json::json!("NO_ACCESS_POLICY")
        );
    }
}

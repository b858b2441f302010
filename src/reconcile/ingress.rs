//! Network ingress of the webhook function.

use async_trait::async_trait;

use super::{Evaluation, Reconcile, ReconcileError};
use crate::gcp::model::{CloudFunction, IngressSettings};
use crate::gcp::{AccessToken, ControlPlane, FunctionRef};

/// Decide whether the function's ingress setting must change.
///
/// The returned descriptor carries every other field unchanged, because the
/// function is updated by replacing the whole object.
pub fn evaluate_ingress(
    mut function: CloudFunction,
    internal_only: bool,
) -> Evaluation<CloudFunction> {
    let desired = IngressSettings::from_internal_only(internal_only);
    if function.ingress_settings.as_ref() == Some(&desired) {
        return Evaluation::Unchanged;
    }
    function.ingress_settings = Some(desired);
    Evaluation::Changed(function)
}

/// Switches a webhook function between public and internal-only ingress.
pub struct WebhookIngress<'a> {
    pub plane: &'a dyn ControlPlane,
    pub token: &'a AccessToken,
    pub function: &'a FunctionRef,
    pub internal_only: bool,
}

#[async_trait]
impl Reconcile for WebhookIngress<'_> {
    type Current = CloudFunction;
    type Desired = CloudFunction;

    fn name(&self) -> &'static str {
        "webhook_ingress"
    }

    async fn fetch(&self) -> Result<CloudFunction, ReconcileError> {
        Ok(self.plane.get_function(self.token, self.function).await?)
    }

    fn evaluate(&self, current: CloudFunction) -> Evaluation<CloudFunction> {
        evaluate_ingress(current, self.internal_only)
    }

    async fn apply(&self, desired: CloudFunction) -> Result<(), ReconcileError> {
        Ok(self
            .plane
            .patch_function(self.token, self.function, &desired)
            .await?)
    }
}

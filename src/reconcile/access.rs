//! Public invocation of the webhook function (IAM `allUsers` invoker binding).

use async_trait::async_trait;

use super::{Evaluation, Reconcile, ReconcileError};
use crate::gcp::model::{ALL_USERS, Binding, INVOKER_ROLE, IamPolicy};
use crate::gcp::{AccessToken, ControlPlane, FunctionRef};

/// Decide whether the invoker bindings of `policy` must change.
///
/// `internal_only == true` means no unauthenticated caller may invoke the
/// function. Policies holding several invoker bindings are edited as found;
/// they are not merged.
pub fn evaluate_invoker_binding(
    mut policy: IamPolicy,
    internal_only: bool,
) -> Evaluation<IamPolicy> {
    let public = policy.is_publicly_invokable();
    if public != internal_only {
        return Evaluation::Unchanged;
    }

    if internal_only {
        for binding in policy.bindings.iter_mut().filter(|b| b.role == INVOKER_ROLE) {
            binding.members.retain(|m| m != ALL_USERS);
        }
    } else {
        let index = match policy.bindings.iter().position(|b| b.role == INVOKER_ROLE) {
            Some(index) => index,
            None => {
                policy.bindings.push(Binding::new(INVOKER_ROLE));
                policy.bindings.len() - 1
            }
        };
        let binding = &mut policy.bindings[index];
        if !binding.has_member(ALL_USERS) {
            binding.members.push(ALL_USERS.to_string());
        }
    }

    Evaluation::Changed(policy)
}

/// Grants or revokes public invocation of a webhook function.
pub struct WebhookAccess<'a> {
    pub plane: &'a dyn ControlPlane,
    pub token: &'a AccessToken,
    pub function: &'a FunctionRef,
    pub internal_only: bool,
}

#[async_trait]
impl Reconcile for WebhookAccess<'_> {
    type Current = IamPolicy;
    type Desired = IamPolicy;

    fn name(&self) -> &'static str {
        "webhook_access"
    }

    async fn fetch(&self) -> Result<IamPolicy, ReconcileError> {
        Ok(self
            .plane
            .get_function_iam_policy(self.token, self.function)
            .await?)
    }

    fn evaluate(&self, current: IamPolicy) -> Evaluation<IamPolicy> {
        evaluate_invoker_binding(current, self.internal_only)
    }

    async fn apply(&self, desired: IamPolicy) -> Result<(), ReconcileError> {
        Ok(self
            .plane
            .set_function_iam_policy(self.token, self.function, &desired)
            .await?)
    }
}

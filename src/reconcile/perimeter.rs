//! Membership of an API in a service perimeter's restricted services.

use async_trait::async_trait;

use super::{Evaluation, Reconcile, ReconcileError};
use crate::gcp::model::ServicePerimeter;
use crate::gcp::{AccessToken, ControlPlane};

pub const CLOUD_FUNCTIONS_API: &str = "cloudfunctions.googleapis.com";
pub const DIALOGFLOW_API: &str = "dialogflow.googleapis.com";

/// Decide whether `api` must be added to or removed from the restricted set.
pub fn evaluate_perimeter(
    mut perimeter: ServicePerimeter,
    api: &str,
    restrict: bool,
) -> Evaluation<ServicePerimeter> {
    if perimeter.restricts(api) == restrict {
        return Evaluation::Unchanged;
    }

    let services = perimeter
        .status
        .get_or_insert_with(Default::default)
        .restricted_services
        .get_or_insert_with(Vec::new);
    if restrict {
        services.push(api.to_string());
    } else {
        services.retain(|s| s != api);
    }

    Evaluation::Changed(perimeter)
}

/// Adds or removes one API from a perimeter's restricted services.
pub struct PerimeterRestriction<'a> {
    pub plane: &'a dyn ControlPlane,
    pub token: &'a AccessToken,
    pub project_id: &'a str,
    pub perimeter_uri: &'a str,
    pub api: &'a str,
    pub restrict: bool,
}

#[async_trait]
impl Reconcile for PerimeterRestriction<'_> {
    type Current = ServicePerimeter;
    type Desired = ServicePerimeter;

    fn name(&self) -> &'static str {
        "security_perimeter"
    }

    async fn fetch(&self) -> Result<ServicePerimeter, ReconcileError> {
        Ok(self
            .plane
            .get_service_perimeter(self.token, self.project_id, self.perimeter_uri)
            .await?)
    }

    fn evaluate(&self, current: ServicePerimeter) -> Evaluation<ServicePerimeter> {
        evaluate_perimeter(current, self.api, self.restrict)
    }

    async fn apply(&self, desired: ServicePerimeter) -> Result<(), ReconcileError> {
        Ok(self
            .plane
            .patch_service_perimeter(self.token, self.project_id, self.perimeter_uri, &desired)
            .await?)
    }
}

//! HTTP request handlers.

mod health;
pub(crate) mod problem_details;
mod update;
mod version;

pub use health::{livez, readyz};
pub use update::{
    update_security_perimeter_cloudfunctions, update_security_perimeter_dialogflow,
    update_service_directory_webhook_fulfillment, update_webhook_access, update_webhook_ingress,
};
pub use version::version;

//! Driven ports of the submission pipeline.
//!
//! Each port owns a typed error enum so adapters translate their failures
//! into predictable variants.

mod broker;
mod captcha_verifier;
mod macros;
mod policy_evaluator;
mod submission_store;
mod template_renderer;
mod webhook_transport;

pub(crate) use macros::define_port_error;

pub use broker::{BrokerChannel, BrokerConnector, BrokerError, BrokerMessage};
pub use captcha_verifier::CaptchaVerifier;
#[cfg(test)]
pub use policy_evaluator::MockPolicyEvaluator;
pub use policy_evaluator::{PolicyEvaluationError, PolicyEvaluator};
#[cfg(test)]
pub use submission_store::MockSubmissionStore;
pub use submission_store::{StoredRecord, SubmissionStore, SubmissionStoreError};
#[cfg(test)]
pub use template_renderer::{FixtureTemplateRenderer, MockTemplateRenderer};
pub use template_renderer::{TemplateError, TemplateRenderer};
#[cfg(test)]
pub use webhook_transport::MockWebhookTransport;
pub use webhook_transport::{WebhookDeliveryError, WebhookRequest, WebhookTransport};

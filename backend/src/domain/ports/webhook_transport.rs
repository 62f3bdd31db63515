//! Driven port for HTTP webhook delivery.

use std::collections::BTreeMap;

use async_trait::async_trait;
use url::Url;

use super::define_port_error;

define_port_error! {
    /// Errors raised by a single webhook attempt.
    pub enum WebhookDeliveryError {
        /// The request could not be built or sent.
        Transport { message: String } => "webhook transport failed: {message}",
        /// The endpoint answered with a non-2xx status.
        Status { status: u16 } => "webhook answered with status {status}",
    }
}

/// Fully rendered webhook request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    /// Destination.
    pub url: Url,
    /// HTTP method.
    pub method: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Vec<u8>,
}

/// Port performing one webhook attempt.
///
/// Success means a 2xx status; the response body is drained and discarded.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Send `request` once.
    async fn send(&self, request: &WebhookRequest) -> Result<(), WebhookDeliveryError>;
}

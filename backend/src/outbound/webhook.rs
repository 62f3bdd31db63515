//! Reqwest-backed webhook transport.
//!
//! Owns transport details only: request construction, status mapping and
//! draining the response body. Per-attempt timeouts and retries belong to
//! the dispatcher.

use async_trait::async_trait;
use reqwest::{Client, Method, Request};

use crate::domain::ports::{WebhookDeliveryError, WebhookRequest, WebhookTransport};

const DEFAULT_USER_AGENT: &str = concat!("web-form/", env!("CARGO_PKG_VERSION"));

/// Webhook transport sharing one connection pool across deliveries.
#[derive(Clone)]
pub struct ReqwestWebhookTransport {
    client: Client,
}

impl ReqwestWebhookTransport {
    /// Build a transport with the default user agent.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Ok(Self { client })
    }

    fn build_request(&self, request: &WebhookRequest) -> Result<Request, WebhookDeliveryError> {
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|err| WebhookDeliveryError::transport(format!("invalid method: {err}")))?;
        let mut builder = self
            .client
            .request(method, request.url.clone())
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
            .build()
            .map_err(|err| WebhookDeliveryError::transport(err.to_string()))
    }
}

#[async_trait]
impl WebhookTransport for ReqwestWebhookTransport {
    async fn send(&self, request: &WebhookRequest) -> Result<(), WebhookDeliveryError> {
        let outgoing = self.build_request(request)?;
        let response = self
            .client
            .execute(outgoing)
            .await
            .map_err(|err| WebhookDeliveryError::transport(err.to_string()))?;
        let status = response.status();
        // Drain so the connection can return to the pool.
        let _ = response.bytes().await;
        if status.is_success() {
            Ok(())
        } else {
            Err(WebhookDeliveryError::status(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use url::Url;

    fn request(method: &str, headers: &[(&str, &str)]) -> WebhookRequest {
        WebhookRequest {
            url: Url::parse("http://hooks.test/in").expect("url"),
            method: method.to_owned(),
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect::<BTreeMap<_, _>>(),
            body: b"{}".to_vec(),
        }
    }

    #[test]
    fn builds_request_with_method_headers_and_body() {
        let transport = ReqwestWebhookTransport::new().expect("client");
        let built = transport
            .build_request(&request("put", &[("X-Token", "abc")]))
            .expect("request builds");
        assert_eq!(built.method(), Method::PUT);
        assert_eq!(built.url().as_str(), "http://hooks.test/in");
        assert_eq!(
            built.headers().get("x-token").and_then(|v| v.to_str().ok()),
            Some("abc")
        );
        assert_eq!(
            built.body().and_then(reqwest::Body::as_bytes),
            Some(b"{}".as_slice())
        );
    }

    #[test]
    fn invalid_header_names_are_transport_errors() {
        let transport = ReqwestWebhookTransport::new().expect("client");
        let err = transport
            .build_request(&request("POST", &[("bad header", "x")]))
            .expect_err("invalid header");
        assert!(matches!(err, WebhookDeliveryError::Transport { .. }));
    }

    #[test]
    fn invalid_methods_are_transport_errors() {
        let transport = ReqwestWebhookTransport::new().expect("client");
        let err = transport
            .build_request(&request("NOT A METHOD", &[]))
            .expect_err("invalid method");
        assert!(matches!(err, WebhookDeliveryError::Transport { .. }));
    }
}

//! Cloudflare Turnstile captcha verifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;
use url::Url;

use crate::domain::ports::CaptchaVerifier;
use crate::domain::validation::FormInput;

/// Input name the Turnstile widget submits its token under.
pub const TURNSTILE_RESPONSE_FIELD: &str = "cf-turnstile-response";

const SITEVERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

#[derive(Serialize)]
struct SiteverifyRequest<'a> {
    secret: &'a str,
    response: &'a str,
    #[serde(rename = "remoteip", skip_serializing_if = "Option::is_none")]
    remote_ip: Option<&'a str>,
}

#[derive(Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Verifies Turnstile tokens against the siteverify endpoint.
///
/// Missing tokens, transport errors and malformed replies all count as a
/// failed challenge.
#[derive(Clone)]
pub struct TurnstileVerifier {
    client: Client,
    endpoint: Url,
    secret: String,
}

impl TurnstileVerifier {
    /// Verifier using `secret` with a per-call `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(secret: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: default_endpoint(),
            secret: secret.into(),
        })
    }

    /// Point the verifier at a different siteverify endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    async fn siteverify(&self, token: &str, remote_ip: Option<&str>) -> Result<bool, String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&SiteverifyRequest {
                secret: &self.secret,
                response: token,
                remote_ip,
            })
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("siteverify returned status {}", status.as_u16()));
        }
        let reply: SiteverifyResponse = response.json().await.map_err(|err| err.to_string())?;
        if !reply.success && !reply.error_codes.is_empty() {
            warn!(errors = ?reply.error_codes, "turnstile rejected token");
        }
        Ok(reply.success)
    }
}

fn default_endpoint() -> Url {
    #[expect(clippy::expect_used, reason = "constant URL is valid")]
    Url::parse(SITEVERIFY_URL).expect("siteverify URL")
}

#[async_trait]
impl CaptchaVerifier for TurnstileVerifier {
    fn name(&self) -> &str {
        "turnstile"
    }

    async fn validate(&self, input: &FormInput, remote_ip: Option<&str>) -> bool {
        let Some(token) = input
            .first(TURNSTILE_RESPONSE_FIELD)
            .filter(|token| !token.is_empty())
        else {
            return false;
        };
        match self.siteverify(token, remote_ip).await {
            Ok(success) => success,
            Err(error) => {
                warn!(%error, "turnstile verification failed");
                false
            }
        }
    }
}

//! Admission gates evaluated before a form is shown or submitted.
//!
//! Gates run strictly in order and the first failure wins:
//!
//! 1. XSRF token (POST only, when enabled)
//! 2. admission policy
//! 3. access code
//! 4. captcha providers (POST only)
//!
//! Session changes made by the code gate are staged and only committed once
//! every gate has passed, so a denied request never mutates session state.

mod session_state;

use std::sync::Arc;

use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

use crate::domain::form::{Credentials, Form};
use crate::domain::ports::CaptchaVerifier;
use crate::domain::validation::FormInput;

pub use session_state::SessionState;

/// HTTP method class relevant to the gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// Render request.
    Get,
    /// Submission.
    Post,
}

/// Anti-forgery token pair for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XsrfTokens {
    /// Token carried in the submitted form.
    pub submitted: Option<String>,
    /// Token previously issued to the client, e.g. via cookie.
    pub issued: Option<String>,
}

impl XsrfTokens {
    /// Both tokens are present, non-empty, and equal.
    pub fn verify(&self) -> bool {
        match (self.submitted.as_deref(), self.issued.as_deref()) {
            (Some(submitted), Some(issued)) if !issued.is_empty() => {
                bool::from(submitted.as_bytes().ct_eq(issued.as_bytes()))
            }
            _ => false,
        }
    }
}

/// Inputs the gates inspect.
#[derive(Debug, Clone, Copy)]
pub struct AccessRequest<'a> {
    /// Request method.
    pub method: RequestMethod,
    /// Anti-forgery tokens; `None` disables the check.
    pub xsrf: Option<&'a XsrfTokens>,
    /// Caller identity, if authenticated.
    pub credentials: Option<&'a Credentials>,
    /// Access code typed into the current submission.
    pub submitted_code: Option<&'a str>,
    /// Raw submission, for captcha providers.
    pub input: &'a FormInput,
    /// Client address, for captcha providers.
    pub remote_ip: Option<&'a str>,
}

/// Reason a request was turned away.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenial {
    /// The anti-forgery token is missing or does not match.
    #[error("anti-forgery token mismatch")]
    XsrfMismatch,
    /// The admission policy rejected the caller.
    #[error("access denied by form policy")]
    PolicyDenied,
    /// The form needs an access code and none is on file.
    #[error("access code required")]
    CodeRequired,
    /// The submitted access code is not valid for this form.
    #[error("access code rejected")]
    CodeRejected,
    /// A captcha provider rejected the challenge.
    #[error("captcha verification failed ({provider})")]
    CaptchaFailed {
        /// Provider that rejected the request.
        provider: String,
    },
}

impl AccessDenial {
    /// Whether the client should be prompted for an access code.
    pub fn prompts_for_code(&self) -> bool {
        matches!(self, Self::CodeRequired | Self::CodeRejected)
    }
}

/// Evaluates the admission gates.
#[derive(Clone, Default)]
pub struct AccessController {
    captcha: Vec<Arc<dyn CaptchaVerifier>>,
}

impl AccessController {
    /// Controller with the given captcha providers, applied to every form.
    pub fn new(captcha: Vec<Arc<dyn CaptchaVerifier>>) -> Self {
        Self { captcha }
    }

    /// Run all gates for `form`.
    ///
    /// On success `session` holds any newly accepted access code; on failure
    /// it is left untouched.
    pub async fn evaluate(
        &self,
        form: &Form,
        request: &AccessRequest<'_>,
        session: &mut SessionState,
    ) -> Result<(), AccessDenial> {
        let is_post = request.method == RequestMethod::Post;

        if is_post && request.xsrf.is_some_and(|tokens| !tokens.verify()) {
            return Err(AccessDenial::XsrfMismatch);
        }

        if !form.is_allowed(request.credentials) {
            return Err(AccessDenial::PolicyDenied);
        }

        let mut staged = session.clone();
        check_code(form, request, &mut staged)?;

        if is_post {
            for provider in &self.captcha {
                if !provider.validate(request.input, request.remote_ip).await {
                    return Err(AccessDenial::CaptchaFailed {
                        provider: provider.name().to_owned(),
                    });
                }
            }
        }

        *session = staged;
        Ok(())
    }
}

/// Session code wins when it is still valid; otherwise only a POST may
/// present a new code, which is promoted into the session on success.
fn check_code(
    form: &Form,
    request: &AccessRequest<'_>,
    session: &mut SessionState,
) -> Result<(), AccessDenial> {
    let codes = form.codes();
    if codes.is_empty() {
        return Ok(());
    }
    if session.access_code().is_some_and(|code| codes.contains(code)) {
        return Ok(());
    }
    if request.method != RequestMethod::Post {
        return Err(AccessDenial::CodeRequired);
    }
    match request.submitted_code.map(str::trim).filter(|code| !code.is_empty()) {
        None => Err(AccessDenial::CodeRequired),
        Some(code) if codes.contains(code) => {
            debug!(form = form.name(), "access code accepted");
            session.accept_code(code);
            Ok(())
        }
        Some(_) => Err(AccessDenial::CodeRejected),
    }
}

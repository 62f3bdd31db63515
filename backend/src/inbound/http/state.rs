//! Shared HTTP adapter state.
//!
//! Handlers accept this state via `actix_web::web::Data` so they only depend
//! on the submission service and the loaded registry.

use std::sync::Arc;

use crate::domain::submission::{FormRegistry, SubmissionService};

/// Request-handling toggles.
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    /// Skip the anti-forgery check.
    pub disable_xsrf: bool,
    /// Answer `GET /` with 404.
    pub disable_listing: bool,
    /// Read caller identity from `X-Forwarded-*` headers.
    pub trusted_identity_headers: bool,
    /// Mark issued cookies `Secure`.
    pub cookie_secure: bool,
    /// Public Turnstile site key, surfaced to clients.
    pub turnstile_site_key: Option<String>,
}

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    /// Loaded forms.
    pub registry: Arc<FormRegistry>,
    /// Submission pipeline.
    pub service: SubmissionService,
    /// Request-handling toggles.
    pub options: HttpOptions,
}

impl HttpState {
    /// Bundle the registry, service and options.
    pub fn new(registry: Arc<FormRegistry>, service: SubmissionService, options: HttpOptions) -> Self {
        Self {
            registry,
            service,
            options,
        }
    }
}

//! Driven port for captcha providers.

use async_trait::async_trait;

use crate::domain::validation::FormInput;

/// Port for verifying a captcha challenge embedded in a submission.
///
/// Providers pick their own response field out of `input`. Any provider
/// error counts as a failed challenge.
#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Whether the challenge in `input` was solved.
    async fn validate(&self, input: &FormInput, remote_ip: Option<&str>) -> bool;
}

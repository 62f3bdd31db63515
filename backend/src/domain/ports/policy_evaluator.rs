//! Driven port for admission policy expressions.

use super::define_port_error;
use crate::domain::form::Credentials;

define_port_error! {
    /// Errors raised while evaluating a compiled policy.
    pub enum PolicyEvaluationError {
        /// The expression failed at runtime.
        Evaluation { message: String } => "policy evaluation failed: {message}",
        /// The expression produced something other than a boolean.
        NonBoolean { kind: String } => "policy returned {kind}, expected a boolean",
    }
}

/// Compiled boolean predicate over caller identity.
#[cfg_attr(test, mockall::automock)]
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluate the predicate with `user`, `email`, and `groups` bound.
    fn evaluate(&self, credentials: &Credentials) -> Result<bool, PolicyEvaluationError>;
}

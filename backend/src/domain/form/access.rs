//! Caller identity, admission policy, and access codes.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::domain::ports::PolicyEvaluator;

/// Identity supplied by the authentication layer in front of the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Credentials {
    /// User identifier.
    pub user: String,
    /// Email address, possibly empty.
    pub email: String,
    /// Group memberships.
    pub groups: Vec<String>,
}

/// Boolean admission predicate over caller [`Credentials`].
///
/// Fails closed: evaluator errors and non-boolean results deny access.
/// Requests without credentials are always admitted.
#[derive(Clone)]
pub struct AccessPolicy {
    source: String,
    evaluator: Arc<dyn PolicyEvaluator>,
}

impl AccessPolicy {
    /// Wrap a compiled evaluator together with its source expression.
    pub fn new(source: impl Into<String>, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self {
            source: source.into(),
            evaluator,
        }
    }

    /// Expression the evaluator was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Decide whether `credentials` may use the form.
    pub fn is_allowed(&self, credentials: Option<&Credentials>) -> bool {
        let Some(credentials) = credentials else {
            return true;
        };
        match self.evaluator.evaluate(credentials) {
            Ok(allowed) => allowed,
            Err(error) => {
                warn!(policy = %self.source, user = %credentials.user, %error, "policy evaluation failed; denying");
                false
            }
        }
    }
}

impl fmt::Debug for AccessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessPolicy")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Shared secrets gating a form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessCodes(BTreeSet<String>);

impl AccessCodes {
    /// Whether the form is gated at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `code` is one of the configured secrets.
    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }
}

impl<S: Into<String>> FromIterator<S> for AccessCodes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(Into::into)
                .filter(|code: &String| !code.is_empty())
                .collect(),
        )
    }
}

//! Rhai-backed admission policies.
//!
//! A policy is a single Rhai expression evaluated with `user`, `email`, and
//! `groups` bound as constants, e.g. `"admins" in groups || email.ends_with("@example.com")`.

use std::sync::Arc;

use rhai::{AST, Array, Dynamic, Engine, Scope};
use thiserror::Error;

use crate::domain::form::Credentials;
use crate::domain::ports::{PolicyEvaluationError, PolicyEvaluator};

/// Upper bound on interpreter steps per evaluation.
const MAX_OPERATIONS: u64 = 10_000;

/// Policy expression that failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid policy `{source_text}`: {message}")]
pub struct PolicyCompileError {
    /// Expression as written.
    pub source_text: String,
    /// Parser message.
    pub message: String,
}

/// Compiles policy expressions against one shared engine.
#[derive(Clone)]
pub struct RhaiPolicyEngine {
    engine: Arc<Engine>,
}

impl RhaiPolicyEngine {
    /// Engine with an operation budget and no access to the outside world.
    pub fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_expr_depths(32, 32);
        Self {
            engine: Arc::new(engine),
        }
    }

    /// Parse `source` into an evaluator.
    pub fn compile(&self, source: &str) -> Result<Arc<dyn PolicyEvaluator>, PolicyCompileError> {
        let ast = self
            .engine
            .compile_expression(source)
            .map_err(|err| PolicyCompileError {
                source_text: source.to_owned(),
                message: err.to_string(),
            })?;
        Ok(Arc::new(RhaiPolicy {
            engine: Arc::clone(&self.engine),
            ast,
        }))
    }
}

impl Default for RhaiPolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct RhaiPolicy {
    engine: Arc<Engine>,
    ast: AST,
}

impl PolicyEvaluator for RhaiPolicy {
    fn evaluate(&self, credentials: &Credentials) -> Result<bool, PolicyEvaluationError> {
        let groups: Array = credentials
            .groups
            .iter()
            .cloned()
            .map(Dynamic::from)
            .collect();
        let mut scope = Scope::new();
        scope.push_constant("user", credentials.user.clone());
        scope.push_constant("email", credentials.email.clone());
        scope.push_constant("groups", groups);

        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map_err(|err| PolicyEvaluationError::evaluation(err.to_string()))?;
        result
            .as_bool()
            .map_err(|kind| PolicyEvaluationError::non_boolean(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn credentials(user: &str, email: &str, groups: &[&str]) -> Credentials {
        Credentials {
            user: user.to_owned(),
            email: email.to_owned(),
            groups: groups.iter().map(|group| (*group).to_owned()).collect(),
        }
    }

    #[rstest]
    #[case(r#""staff" in groups"#, &["staff"], true)]
    #[case(r#""staff" in groups"#, &["guests"], false)]
    #[case(r#"user == "ann" && email.ends_with("@example.com")"#, &[], true)]
    #[case("groups.len() > 1", &["a", "b"], true)]
    fn evaluates_boolean_expressions(
        #[case] source: &str,
        #[case] groups: &[&str],
        #[case] expected: bool,
    ) {
        let policy = RhaiPolicyEngine::new().compile(source).expect("compiles");
        let allowed = policy
            .evaluate(&credentials("ann", "ann@example.com", groups))
            .expect("evaluates");
        assert_eq!(allowed, expected);
    }

    #[test]
    fn non_boolean_results_are_errors() {
        let policy = RhaiPolicyEngine::new().compile("user").expect("compiles");
        let err = policy
            .evaluate(&credentials("ann", "", &[]))
            .expect_err("string result");
        assert!(matches!(err, PolicyEvaluationError::NonBoolean { .. }));
    }

    #[test]
    fn runtime_failures_are_errors() {
        let policy = RhaiPolicyEngine::new()
            .compile("groups[5] == \"x\"")
            .expect("compiles");
        let err = policy
            .evaluate(&credentials("ann", "", &[]))
            .expect_err("index out of bounds");
        assert!(matches!(err, PolicyEvaluationError::Evaluation { .. }));
    }

    #[test]
    fn malformed_expressions_fail_to_compile() {
        let err = RhaiPolicyEngine::new()
            .compile("user ==")
            .err()
            .expect("parse error");
        assert_eq!(err.source_text, "user ==");
    }

    #[test]
    fn statements_are_rejected() {
        assert!(RhaiPolicyEngine::new().compile("let x = 1; x").is_err());
    }
}

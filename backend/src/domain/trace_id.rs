//! Correlation identifier for one form request.
//!
//! The trace middleware opens a scope per request. Errors read the identifier
//! back with [`TraceId::current`], and queued notifications capture it at
//! enqueue time so the delivery worker can re-enter the same scope with
//! [`TraceId::scope`]. Task locals are not inherited by `tokio::spawn`.

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use tokio::task_local;
use uuid::Uuid;

task_local! {
    static CURRENT: TraceId;
}

/// Identifier shared by the request log line, error envelopes and any
/// notification deliveries the request triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Identifier of the enclosing request scope, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        CURRENT.try_with(|id| *id).ok()
    }

    /// Captured identifier, or a fresh one for work that started outside a
    /// request.
    #[must_use]
    pub fn or_generate(captured: Option<Self>) -> Self {
        captured.unwrap_or_else(Self::generate)
    }

    /// Run `fut` with `trace_id` as the current identifier.
    ///
    /// ```
    /// use web_form::domain::TraceId;
    ///
    /// # tokio::runtime::Runtime::new().unwrap().block_on(async {
    /// let id = TraceId::generate();
    /// assert_eq!(TraceId::scope(id, async { TraceId::current() }).await, Some(id));
    /// # });
    /// ```
    pub async fn scope<Fut: Future>(trace_id: Self, fut: Fut) -> Fut::Output {
        CURRENT.scope(trace_id, fut).await
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for TraceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scope_is_visible_inside_and_gone_outside() {
        let id = TraceId::generate();
        assert_eq!(TraceId::scope(id, async { TraceId::current() }).await, Some(id));
        assert!(TraceId::current().is_none());
    }

    #[tokio::test]
    async fn captured_id_follows_work_onto_another_task() {
        let id = TraceId::generate();
        let captured = TraceId::scope(id, async { TraceId::current() }).await;
        let seen = tokio::spawn(async move {
            TraceId::scope(TraceId::or_generate(captured), async { TraceId::current() }).await
        })
        .await
        .expect("task joins");
        assert_eq!(seen, Some(id));
    }

    #[test]
    fn or_generate_fills_missing_ids() {
        let first = TraceId::or_generate(None);
        let second = TraceId::or_generate(None);
        assert_ne!(first, second);
    }

    #[test]
    fn text_form_is_a_hyphenated_uuid() {
        let id: TraceId = "00000000-0000-0000-0000-00000000002a"
            .parse()
            .expect("valid uuid");
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-00000000002a");
        assert!("not-a-uuid".parse::<TraceId>().is_err());
    }
}

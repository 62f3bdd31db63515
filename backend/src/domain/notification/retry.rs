//! Bounded retry loop shared by every sink.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::domain::form::RetryPolicy;

/// Async sleep abstraction so tests can observe retry spacing.
#[async_trait]
pub trait RetrySleeper: Send + Sync {
    /// Suspend execution for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Tokio-based sleeper.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl RetrySleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// One deliverable unit of work.
#[async_trait]
pub(crate) trait Deliver: Send {
    /// Failure reported by a single attempt.
    type Error: Display + Send;

    /// Perform one attempt.
    async fn attempt(&mut self) -> Result<(), Self::Error>;

    /// Hook run after a failed or timed-out attempt.
    async fn after_failure(&mut self) {}
}

/// Terminal state of a delivery task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// An attempt succeeded.
    Delivered {
        /// Attempts consumed, including the successful one.
        attempts: u32,
    },
    /// Every permitted attempt failed.
    Exhausted {
        /// Attempts consumed.
        attempts: u32,
    },
    /// Shutdown interrupted the wait before the next attempt.
    Interrupted {
        /// Attempts consumed before shutdown.
        attempts: u32,
    },
}

/// Drive `delivery` until it succeeds, exhausts `policy`, or `shutdown`
/// fires during a wait.
///
/// Every attempt is bounded by `policy.timeout`; at most `policy.retry + 1`
/// attempts are made, separated by `policy.interval`.
pub(crate) async fn deliver_with_retry<D: Deliver>(
    delivery: &mut D,
    policy: &RetryPolicy,
    sleeper: &Arc<dyn RetrySleeper>,
    shutdown: &CancellationToken,
    sink: &str,
) -> DeliveryOutcome {
    let mut attempts: u32 = 0;
    loop {
        attempts = attempts.saturating_add(1);
        let failure = match tokio::time::timeout(policy.timeout, delivery.attempt()).await {
            Ok(Ok(())) => {
                info!(sink, attempts, "notification delivered");
                return DeliveryOutcome::Delivered { attempts };
            }
            Ok(Err(error)) => error.to_string(),
            Err(_) => format!("attempt timed out after {:?}", policy.timeout),
        };
        warn!(sink, attempt = attempts, retries = policy.retry, error = %failure, "notification attempt failed");
        delivery.after_failure().await;

        if attempts > policy.retry {
            error!(sink, attempts, "notification retries exhausted");
            return DeliveryOutcome::Exhausted { attempts };
        }

        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                info!(sink, attempts, "notification retry interrupted by shutdown");
                return DeliveryOutcome::Interrupted { attempts };
            }
            () = sleeper.sleep(policy.interval) => {}
        }
    }
}

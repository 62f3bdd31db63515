//! Notification target definitions.

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

/// Delivery bounds shared by every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure.
    pub retry: u32,
    /// Upper bound for a single attempt.
    pub timeout: Duration,
    /// Wait between attempts.
    pub interval: Duration,
}

impl RetryPolicy {
    /// Default number of retries.
    pub const DEFAULT_RETRY: u32 = 3;
    /// Default per-attempt timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default wait between attempts.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);

    /// Total attempts a task may consume.
    pub const fn max_attempts(&self) -> u32 {
        self.retry.saturating_add(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry: Self::DEFAULT_RETRY,
            timeout: Self::DEFAULT_TIMEOUT,
            interval: Self::DEFAULT_INTERVAL,
        }
    }
}

/// HTTP endpoint notified of each stored submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookTarget {
    /// Destination URL.
    pub url: Url,
    /// Upper-case HTTP method, `POST` by default.
    pub method: String,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Body template; JSON of the stored record when absent.
    pub payload: Option<String>,
    /// Delivery bounds.
    pub retry: RetryPolicy,
}

impl WebhookTarget {
    /// POST the default JSON payload to `url` with default retry bounds.
    pub fn new(url: Url) -> Self {
        Self {
            url,
            method: "POST".to_owned(),
            headers: BTreeMap::new(),
            payload: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// AMQP publish notified of each stored submission.
///
/// `routing_key`, `correlation_id`, and `message_id` are templates rendered
/// against the submission when the task is queued.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerTarget {
    /// Exchange name; empty selects the default exchange.
    pub exchange: String,
    /// Routing-key template.
    pub routing_key: String,
    /// Content type; `application/json` when unset.
    pub content_type: Option<String>,
    /// Correlation-id template.
    pub correlation_id: Option<String>,
    /// Message-id template.
    pub message_id: Option<String>,
    /// Static message headers.
    pub headers: BTreeMap<String, String>,
    /// Body template; JSON of the stored record when absent.
    pub payload: Option<String>,
    /// Delivery bounds.
    pub retry: RetryPolicy,
}

/// Any configured notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    /// HTTP webhook.
    Webhook(WebhookTarget),
    /// Message-broker publish.
    Broker(BrokerTarget),
}

impl NotificationTarget {
    /// Short description used in logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Webhook(target) => format!("{} {}", target.method, target.url),
            Self::Broker(target) => format!("amqp {}/{}", target.exchange, target.routing_key),
        }
    }

    /// Templates that must compile at load time.
    pub fn templates(&self) -> Vec<&str> {
        match self {
            Self::Webhook(target) => target.payload.iter().map(String::as_str).collect(),
            Self::Broker(target) => std::iter::once(target.routing_key.as_str())
                .chain(target.correlation_id.as_deref())
                .chain(target.message_id.as_deref())
                .chain(target.payload.as_deref())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 1)]
    #[case(2, 3)]
    #[case(u32::MAX, u32::MAX)]
    fn max_attempts_is_retry_plus_one(#[case] retry: u32, #[case] expected: u32) {
        let policy = RetryPolicy {
            retry,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.max_attempts(), expected);
    }

    #[test]
    fn broker_templates_include_metadata() {
        let target = NotificationTarget::Broker(BrokerTarget {
            routing_key: "forms.{{ form.name }}".to_owned(),
            message_id: Some("{{ result.ID }}".to_owned()),
            ..BrokerTarget::default()
        });
        assert_eq!(
            target.templates(),
            vec!["forms.{{ form.name }}", "{{ result.ID }}"]
        );
    }
}

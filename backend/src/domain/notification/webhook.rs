//! Webhook sink: unconstrained fan-out, one task per queued delivery.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::retry::{Deliver, DeliveryOutcome, RetrySleeper, TokioSleeper, deliver_with_retry};
use super::{DispatchError, DispatchQueue, Notification, NotificationEvent};
use crate::domain::TraceId;
use crate::domain::form::{RetryPolicy, WebhookTarget};
use crate::domain::ports::{
    TemplateRenderer, WebhookDeliveryError, WebhookRequest, WebhookTransport,
};

const JSON_CONTENT_TYPE: &str = "application/json";

struct WebhookTask {
    request: WebhookRequest,
    retry: RetryPolicy,
    trace_id: Option<TraceId>,
}

struct WebhookDelivery {
    transport: Arc<dyn WebhookTransport>,
    request: WebhookRequest,
}

#[async_trait]
impl Deliver for WebhookDelivery {
    type Error = WebhookDeliveryError;

    async fn attempt(&mut self) -> Result<(), Self::Error> {
        self.transport.send(&self.request).await
    }
}

/// Queue plus worker pool for HTTP webhooks.
///
/// Deliveries run concurrently, so ordering between tasks is not preserved.
pub struct WebhookDispatcher {
    queue: DispatchQueue<WebhookTask>,
    transport: Arc<dyn WebhookTransport>,
    renderer: Arc<dyn TemplateRenderer>,
    sleeper: Arc<dyn RetrySleeper>,
}

impl WebhookDispatcher {
    /// Dispatcher with a queue of `capacity` pending tasks.
    pub fn new(
        capacity: usize,
        transport: Arc<dyn WebhookTransport>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            queue: DispatchQueue::new(capacity),
            transport,
            renderer,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleeper used between attempts.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn RetrySleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Bind `target` to this dispatcher.
    pub fn create(self: &Arc<Self>, target: WebhookTarget) -> Arc<dyn Notification> {
        Arc::new(WebhookNotification {
            dispatcher: Arc::clone(self),
            target,
        })
    }

    /// Drain the queue until `shutdown` fires, spawning one delivery task per
    /// queued item, then wait for in-flight deliveries to finish.
    ///
    /// Shutdown also interrupts the retry waits of in-flight deliveries.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut deliveries: JoinSet<DeliveryOutcome> = JoinSet::new();
        loop {
            tokio::select! {
                task = self.queue.next(&shutdown) => match task {
                    Some(task) => {
                        deliveries.spawn(self.deliver(task, shutdown.clone()));
                    }
                    None => break,
                },
                Some(joined) = deliveries.join_next(), if !deliveries.is_empty() => {
                    log_join(joined);
                }
            }
        }
        self.queue.close().await;
        while let Some(joined) = deliveries.join_next().await {
            log_join(joined);
        }
        info!("webhook dispatcher stopped");
    }

    fn deliver(
        &self,
        task: WebhookTask,
        shutdown: CancellationToken,
    ) -> impl Future<Output = DeliveryOutcome> + Send + 'static {
        let sleeper = Arc::clone(&self.sleeper);
        let WebhookTask {
            request,
            retry,
            trace_id,
        } = task;
        let sink = format!("{} {}", request.method, request.url);
        let mut delivery = WebhookDelivery {
            transport: Arc::clone(&self.transport),
            request,
        };
        TraceId::scope(TraceId::or_generate(trace_id), async move {
            deliver_with_retry(&mut delivery, &retry, &sleeper, &shutdown, &sink).await
        })
    }
}

fn log_join(joined: Result<DeliveryOutcome, tokio::task::JoinError>) {
    if let Err(join_error) = joined {
        error!(error = %join_error, "webhook delivery task failed");
    }
}

struct WebhookNotification {
    dispatcher: Arc<WebhookDispatcher>,
    target: WebhookTarget,
}

#[async_trait]
impl Notification for WebhookNotification {
    fn describe(&self) -> String {
        format!("{} {}", self.target.method, self.target.url)
    }

    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        event: &NotificationEvent,
    ) -> Result<(), DispatchError> {
        let context = event.template_context();
        let body = event.body(
            self.dispatcher.renderer.as_ref(),
            self.target.payload.as_deref(),
            &context,
        )?;
        let mut headers = self.target.headers.clone();
        if self.target.payload.is_none()
            && !headers
                .keys()
                .any(|name| name.eq_ignore_ascii_case("content-type"))
        {
            headers.insert("Content-Type".to_owned(), JSON_CONTENT_TYPE.to_owned());
        }
        let task = WebhookTask {
            request: WebhookRequest {
                url: self.target.url.clone(),
                method: self.target.method.clone(),
                headers,
                body,
            },
            retry: self.target.retry,
            trace_id: event.trace_id,
        };
        self.dispatcher.queue.enqueue(cancel, task).await
    }
}

//! Broker sink: a single worker serialises every publish over one channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::retry::{Deliver, RetrySleeper, TokioSleeper, deliver_with_retry};
use super::{DispatchError, DispatchQueue, Notification, NotificationEvent};
use crate::domain::TraceId;
use crate::domain::form::{BrokerTarget, RetryPolicy};
use crate::domain::ports::{
    BrokerChannel, BrokerConnector, BrokerError, BrokerMessage, TemplateRenderer,
};

const DEFAULT_CONTENT_TYPE: &str = "application/json";

struct BrokerTask {
    message: BrokerMessage,
    retry: RetryPolicy,
    trace_id: Option<TraceId>,
}

/// Connection state owned by the broker worker.
///
/// `Disconnected -> Connected` happens lazily on the next attempt; any
/// failure or timeout drops back to `Disconnected` so a stale channel is
/// never reused.
enum ChannelState {
    Disconnected,
    Connected(Box<dyn BrokerChannel>),
}

impl ChannelState {
    async fn channel(
        &mut self,
        connector: &dyn BrokerConnector,
    ) -> Result<&mut Box<dyn BrokerChannel>, BrokerError> {
        if matches!(self, Self::Disconnected) {
            debug!("opening broker channel");
            *self = Self::Connected(connector.connect().await?);
        }
        match self {
            Self::Connected(channel) => Ok(channel),
            Self::Disconnected => Err(BrokerError::connect("channel unavailable")),
        }
    }

    async fn reset(&mut self) {
        if let Self::Connected(mut channel) = std::mem::replace(self, Self::Disconnected) {
            debug!("closing broker channel after failure");
            channel.close().await;
        }
    }
}

struct BrokerDelivery<'a> {
    connector: &'a dyn BrokerConnector,
    state: &'a mut ChannelState,
    message: &'a BrokerMessage,
}

#[async_trait]
impl Deliver for BrokerDelivery<'_> {
    type Error = BrokerError;

    async fn attempt(&mut self) -> Result<(), Self::Error> {
        let channel = self.state.channel(self.connector).await?;
        channel.publish(self.message).await
    }

    async fn after_failure(&mut self) {
        self.state.reset().await;
    }
}

/// Queue plus single worker for AMQP publishing.
///
/// Deliveries happen strictly in enqueue order over one shared channel.
pub struct BrokerDispatcher {
    queue: DispatchQueue<BrokerTask>,
    connector: Arc<dyn BrokerConnector>,
    renderer: Arc<dyn TemplateRenderer>,
    sleeper: Arc<dyn RetrySleeper>,
}

impl BrokerDispatcher {
    /// Dispatcher with a queue of `capacity` pending tasks.
    pub fn new(
        capacity: usize,
        connector: Arc<dyn BrokerConnector>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        Self {
            queue: DispatchQueue::new(capacity),
            connector,
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
    pub fn create(self: &Arc<Self>, target: BrokerTarget) -> Arc<dyn Notification> {
        Arc::new(BrokerNotification {
            dispatcher: Arc::clone(self),
            target,
        })
    }

    /// Publish queued messages one at a time until `shutdown` fires.
    ///
    /// Only one `run` may be active per dispatcher; the worker exclusively
    /// owns the broker channel.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut state = ChannelState::Disconnected;
        while let Some(task) = self.queue.next(&shutdown).await {
            let BrokerTask {
                message,
                retry,
                trace_id,
            } = task;
            let sink = format!("amqp {}/{}", message.exchange, message.routing_key);
            let mut delivery = BrokerDelivery {
                connector: self.connector.as_ref(),
                state: &mut state,
                message: &message,
            };
            TraceId::scope(
                TraceId::or_generate(trace_id),
                deliver_with_retry(&mut delivery, &retry, &self.sleeper, &shutdown, &sink),
            )
            .await;
        }
        self.queue.close().await;
        state.reset().await;
        info!("broker dispatcher stopped");
    }
}

struct BrokerNotification {
    dispatcher: Arc<BrokerDispatcher>,
    target: BrokerTarget,
}

impl BrokerNotification {
    fn render_optional(
        &self,
        event: &NotificationEvent,
        template: Option<&str>,
        context: &serde_json::Value,
    ) -> Result<Option<String>, DispatchError> {
        template
            .filter(|source| !source.is_empty())
            .map(|source| event.render(self.dispatcher.renderer.as_ref(), source, context))
            .transpose()
    }
}

#[async_trait]
impl Notification for BrokerNotification {
    fn describe(&self) -> String {
        format!("amqp {}/{}", self.target.exchange, self.target.routing_key)
    }

    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        event: &NotificationEvent,
    ) -> Result<(), DispatchError> {
        let renderer = self.dispatcher.renderer.as_ref();
        let context = event.template_context();
        let routing_key = event.render(renderer, &self.target.routing_key, &context)?;
        let correlation_id =
            self.render_optional(event, self.target.correlation_id.as_deref(), &context)?;
        let message_id = self.render_optional(event, self.target.message_id.as_deref(), &context)?;
        let body = event.body(renderer, self.target.payload.as_deref(), &context)?;
        let content_type = self
            .target
            .content_type
            .clone()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned());

        let task = BrokerTask {
            message: BrokerMessage {
                exchange: self.target.exchange.clone(),
                routing_key,
                content_type,
                correlation_id,
                message_id,
                headers: self.target.headers.clone(),
                body,
            },
            retry: self.target.retry,
            trace_id: event.trace_id,
        };
        self.dispatcher.queue.enqueue(cancel, task).await
    }
}

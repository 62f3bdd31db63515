//! Asynchronous, retrying notification dispatch.
//!
//! Each dispatcher owns a bounded FIFO queue. Request handlers only await
//! the enqueue, which blocks while the queue is full and aborts when the
//! caller's cancellation token fires. Background workers drain the queue
//! and run the shared retry loop in [`retry`].
//!
//! Payloads and metadata are rendered at enqueue time, so a broken template
//! fails that one dispatch immediately instead of inside a worker.

mod broker;
mod retry;
mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::domain::TraceId;
use crate::domain::form::Form;
use crate::domain::ports::{StoredRecord, TemplateError, TemplateRenderer};

pub use broker::BrokerDispatcher;
pub use retry::{DeliveryOutcome, RetrySleeper, TokioSleeper};
pub use webhook::WebhookDispatcher;

/// Default queue capacity per dispatcher.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Successful submission handed to notification sinks.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    form: Arc<Form>,
    record: StoredRecord,
    trace_id: Option<TraceId>,
}

impl NotificationEvent {
    /// Event for `record` stored through `form`, tagged with the current
    /// trace identifier.
    pub fn new(form: Arc<Form>, record: StoredRecord) -> Self {
        Self {
            form,
            record,
            trace_id: TraceId::current(),
        }
    }

    /// Originating form.
    pub fn form(&self) -> &Form {
        &self.form
    }

    /// Stored record.
    pub fn record(&self) -> &StoredRecord {
        &self.record
    }

    /// `{form, result}` context for payload and metadata templates.
    pub fn template_context(&self) -> Value {
        json!({
            "form": self.form.summary(),
            "result": self.record,
        })
    }

    fn render(
        &self,
        renderer: &dyn TemplateRenderer,
        template: &str,
        context: &Value,
    ) -> Result<String, DispatchError> {
        renderer
            .render(template, context)
            .map_err(DispatchError::Render)
    }

    /// Rendered `payload` template, or the record as JSON when absent.
    fn body(
        &self,
        renderer: &dyn TemplateRenderer,
        payload: Option<&str>,
        context: &Value,
    ) -> Result<Vec<u8>, DispatchError> {
        match payload {
            Some(template) => self
                .render(renderer, template, context)
                .map(String::into_bytes),
            None => serde_json::to_vec(&self.record).map_err(|error| DispatchError::Encoding {
                message: error.to_string(),
            }),
        }
    }
}

/// Why an event could not be queued.
///
/// Delivery failures are never reported here; they are retried and logged
/// by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The caller gave up while waiting for queue space.
    #[error("dispatch cancelled while waiting for queue space")]
    Cancelled,
    /// The dispatcher has shut down.
    #[error("dispatcher queue is closed")]
    Closed,
    /// A payload or metadata template failed to render.
    #[error(transparent)]
    Render(TemplateError),
    /// The default JSON payload could not be encoded.
    #[error("payload encoding failed: {message}")]
    Encoding {
        /// Encoder message.
        message: String,
    },
}

impl DispatchError {
    /// Whether later targets of the same submission should still be tried.
    pub fn affects_only_this_target(&self) -> bool {
        matches!(self, Self::Render(_) | Self::Encoding { .. })
    }
}

/// Handle bound to one configured target.
#[async_trait]
pub trait Notification: Send + Sync {
    /// Human-readable target description for logs.
    fn describe(&self) -> String;

    /// Render the event for this target and queue it for delivery.
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        event: &NotificationEvent,
    ) -> Result<(), DispatchError>;
}

/// Bounded multi-producer, multi-consumer FIFO.
struct DispatchQueue<T> {
    sender: mpsc::Sender<T>,
    receiver: Mutex<mpsc::Receiver<T>>,
}

impl<T: Send> DispatchQueue<T> {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    async fn enqueue(&self, cancel: &CancellationToken, task: T) -> Result<(), DispatchError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(DispatchError::Cancelled),
            sent = self.sender.send(task) => sent.map_err(|_| DispatchError::Closed),
        }
    }

    /// Next task, or `None` once `shutdown` fires.
    async fn next(&self, shutdown: &CancellationToken) -> Option<T> {
        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            task = receiver.recv() => task,
        }
    }

    /// Refuse further tasks; queued ones are dropped with the receiver.
    async fn close(&self) {
        self.receiver.lock().await.close();
    }
}

#[cfg(test)]
mod tests;

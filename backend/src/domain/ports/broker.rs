//! Driven ports for message-broker publishing.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::define_port_error;

define_port_error! {
    /// Errors raised while talking to the broker.
    pub enum BrokerError {
        /// Opening the connection or channel failed.
        Connect { message: String } => "broker connection failed: {message}",
        /// The publish was not confirmed.
        Publish { message: String } => "broker publish failed: {message}",
    }
}

/// Fully rendered broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Exchange; empty for the default exchange.
    pub exchange: String,
    /// Routing key.
    pub routing_key: String,
    /// MIME type of `body`.
    pub content_type: String,
    /// Correlation identifier property.
    pub correlation_id: Option<String>,
    /// Message identifier property.
    pub message_id: Option<String>,
    /// Application headers.
    pub headers: BTreeMap<String, String>,
    /// Message body.
    pub body: Vec<u8>,
}

/// Opens broker channels.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Open a fresh connection and channel.
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>, BrokerError>;
}

/// Open channel owned by the broker worker.
#[async_trait]
pub trait BrokerChannel: Send {
    /// Publish one message and wait for the broker to accept it.
    async fn publish(&mut self, message: &BrokerMessage) -> Result<(), BrokerError>;

    /// Close the channel and its connection, ignoring errors.
    async fn close(&mut self);
}

//! Lapin-backed broker connector.
//!
//! Each [`LapinConnector::connect`] opens a fresh connection with a single
//! confirm-mode channel. The broker dispatcher owns the channel and drops it
//! after any failure, so reconnection policy lives in the domain.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::{debug, warn};

use crate::domain::ports::{BrokerChannel, BrokerConnector, BrokerError, BrokerMessage};

const REPLY_SUCCESS: u16 = 200;

/// Opens AMQP 0-9-1 connections to one broker URL.
#[derive(Debug, Clone)]
pub struct LapinConnector {
    url: String,
}

impl LapinConnector {
    /// Connector for an `amqp://` or `amqps://` URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl BrokerConnector for LapinConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerChannel>, BrokerError> {
        let connection = Connection::connect(&self.url, ConnectionProperties::default())
            .await
            .map_err(|err| BrokerError::connect(err.to_string()))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|err| BrokerError::connect(err.to_string()))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|err| BrokerError::connect(err.to_string()))?;
        debug!(channel = channel.id(), "broker channel opened");
        Ok(Box::new(LapinChannel {
            connection,
            channel,
        }))
    }
}

struct LapinChannel {
    connection: Connection,
    channel: Channel,
}

#[async_trait]
impl BrokerChannel for LapinChannel {
    async fn publish(&mut self, message: &BrokerMessage) -> Result<(), BrokerError> {
        let confirmation = self
            .channel
            .basic_publish(
                &message.exchange,
                &message.routing_key,
                BasicPublishOptions::default(),
                &message.body,
                properties(message),
            )
            .await
            .map_err(|err| BrokerError::publish(err.to_string()))?
            .await
            .map_err(|err| BrokerError::publish(err.to_string()))?;
        if confirmation.is_nack() {
            return Err(BrokerError::publish("broker rejected the message"));
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(error) = self.channel.close(REPLY_SUCCESS, "OK").await {
            warn!(%error, "closing broker channel failed");
        }
        if let Err(error) = self.connection.close(REPLY_SUCCESS, "OK").await {
            warn!(%error, "closing broker connection failed");
        }
    }
}

fn properties(message: &BrokerMessage) -> BasicProperties {
    let mut props = BasicProperties::default()
        .with_content_type(ShortString::from(message.content_type.clone()))
        .with_timestamp(unix_seconds());
    if let Some(id) = &message.message_id {
        props = props.with_message_id(ShortString::from(id.clone()));
    }
    if let Some(id) = &message.correlation_id {
        props = props.with_correlation_id(ShortString::from(id.clone()));
    }
    if !message.headers.is_empty() {
        props = props.with_headers(headers(message));
    }
    props
}

fn headers(message: &BrokerMessage) -> FieldTable {
    let mut table = FieldTable::default();
    for (name, value) in &message.headers {
        table.insert(
            ShortString::from(name.clone()),
            AMQPValue::LongString(LongString::from(value.clone())),
        );
    }
    table
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

//! AMQP consuming side of the queue contract.

use futures_util::StreamExt;
use lapin::options::BasicConsumeOptions;
use lapin::types::FieldTable;
use lapin::{Connection, ConnectionProperties, Consumer};
use tracing::warn;

use crate::publisher::declare_queue;

#[derive(thiserror::Error, Debug)]
pub enum ConsumeError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),
}

#[derive(Debug, Clone)]
pub struct QueueConsumerConfig {
    pub uri: String,
    pub queue: String,
    pub consumer_tag: String,
}

/// Subscription on the pipeline queue with automatic acknowledgment: the
/// broker considers a message delivered the moment it is handed over,
/// before any processing. A crash after delivery loses the reading.
pub struct QueueConsumer {
    consumer: Consumer,
    _connection: Connection,
}

impl QueueConsumer {
    pub async fn subscribe(cfg: QueueConsumerConfig) -> Result<Self, ConsumeError> {
        let connection = Connection::connect(&cfg.uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        declare_queue(&channel, &cfg.queue).await?;

        let consumer = channel
            .basic_consume(
                &cfg.queue,
                &cfg.consumer_tag,
                BasicConsumeOptions {
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        Ok(Self {
            consumer,
            _connection: connection,
        })
    }

    /// Payload of the next delivery. `None` once the delivery stream ends
    /// (connection gone). Stream-level errors are logged and skipped.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            match self.consumer.next().await? {
                Ok(delivery) => return Some(delivery.data),
                Err(e) => {
                    warn!("delivery stream error: {e} (skipping)");
                }
            }
        }
    }
}

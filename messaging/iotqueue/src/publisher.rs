//! AMQP publishing side of the queue contract.
//!
//! Listeners publish through a [`PublisherPool`]: one broker connection,
//! a fixed set of channels, and scoped acquire/release per publish. The
//! pool is owned by the process context and handed to every listener, so
//! concurrent request handlers never share a channel.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::envelope::{CodecError, Envelope};

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("amqp error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("encode failed: {0}")]
    Encode(#[from] CodecError),

    #[error("publisher pool closed")]
    PoolClosed,
}

/// AMQP URI for a broker host, default port and vhost.
pub fn amqp_uri(host: &str) -> String {
    format!("amqp://{host}:5672/%2f")
}

/// Declare the pipeline queue. Publisher and consumer both go through
/// this, so the two declarations cannot disagree.
pub(crate) async fn declare_queue(channel: &Channel, queue: &str) -> Result<(), lapin::Error> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(())
}

/// Seam between the listeners and the outbound transport.
#[async_trait]
pub trait Publish: Send + Sync {
    async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError>;
}

#[derive(Debug, Clone)]
pub struct PublisherPoolConfig {
    pub uri: String,
    pub queue: String,
    pub pool_size: usize,
}

pub struct PublisherPool {
    queue: String,
    free: Arc<Mutex<VecDeque<Channel>>>,
    permits: Arc<Semaphore>,
    // Dropping the connection closes every channel; keep it alive for the
    // lifetime of the pool.
    _connection: Connection,
}

impl PublisherPool {
    pub async fn connect(cfg: PublisherPoolConfig) -> Result<Self, PublishError> {
        let connection = Connection::connect(&cfg.uri, ConnectionProperties::default()).await?;

        let size = cfg.pool_size.max(1);
        let first = connection.create_channel().await?;
        declare_queue(&first, &cfg.queue).await?;

        let mut channels = VecDeque::with_capacity(size);
        channels.push_back(first);
        for _ in 1..size {
            channels.push_back(connection.create_channel().await?);
        }

        debug!("publisher pool ready: queue '{}', {} channels", cfg.queue, size);

        Ok(Self {
            queue: cfg.queue,
            free: Arc::new(Mutex::new(channels)),
            permits: Arc::new(Semaphore::new(size)),
            _connection: connection,
        })
    }

    /// Take a channel out of the pool. The returned handle puts it back
    /// when dropped.
    pub async fn acquire(&self) -> Result<PooledPublisher, PublishError> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PublishError::PoolClosed)?;

        // Holding a permit guarantees a free channel.
        let channel = self
            .free
            .lock()
            .ok()
            .and_then(|mut free| free.pop_front())
            .ok_or(PublishError::PoolClosed)?;

        Ok(PooledPublisher {
            channel: Some(channel),
            queue: self.queue.clone(),
            free: self.free.clone(),
            _permit: permit,
        })
    }
}

#[async_trait]
impl Publish for PublisherPool {
    async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
        self.acquire().await?.publish(envelope).await
    }
}

/// A pool channel checked out for one or more publishes.
pub struct PooledPublisher {
    channel: Option<Channel>,
    queue: String,
    free: Arc<Mutex<VecDeque<Channel>>>,
    _permit: OwnedSemaphorePermit,
}

impl PooledPublisher {
    /// Serialize and enqueue. The broker confirm is not awaited: a crash
    /// between this call and broker acknowledgment silently drops the
    /// reading (at-most-once from the producer side).
    pub async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
        let payload = envelope.encode()?;
        let channel = self.channel.as_ref().ok_or(PublishError::PoolClosed)?;

        let _confirm = channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await?;

        Ok(())
    }
}

impl Drop for PooledPublisher {
    fn drop(&mut self) {
        if let Some(channel) = self.channel.take() {
            if let Ok(mut free) = self.free.lock() {
                free.push_back(channel);
            }
        }
    }
}

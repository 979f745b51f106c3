//! Queue contract shared by the ingestion gateway and the dispatcher:
//! - the [`Envelope`] wire schema and its codec
//! - the [`Publish`] seam and the AMQP publisher pool
//! - the auto-ack queue consumer

pub mod consumer;
pub mod envelope;
pub mod publisher;

pub use consumer::{ConsumeError, QueueConsumer, QueueConsumerConfig};
pub use envelope::{CodecError, Device, Envelope, RawReading};
pub use publisher::{amqp_uri, Publish, PublishError, PooledPublisher, PublisherPool, PublisherPoolConfig};

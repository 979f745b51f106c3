//! Multi-protocol sensor ingestion gateway.
//!
//! Three listener kinds feed the pipeline:
//! - two TCP byte-stream listeners (temperature and smoke families)
//! - an MQTT topic subscriber (motion)
//! - an HTTP endpoint (humidity)
//!
//! Every listener normalizes its transport payload into the shared
//! envelope and hands it to the pooled queue publisher.

pub mod config;
pub mod listeners;

pub use config::GatewayConfig;
pub use listeners::http::{create_router, ApiState, HumidityReading};
pub use listeners::mqtt::{TopicSubscriber, TopicSubscriberConfig};
pub use listeners::stream::{SensorFamily, StreamListener, StreamListenerConfig};

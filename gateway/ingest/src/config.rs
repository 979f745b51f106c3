//! Gateway configuration.
//!
//! Environment variables with defaults for local operation; listener
//! ports and the topic name are fixed, matching the deployed producers.

use std::env;

use crate::listeners::mqtt::TopicSubscriberConfig;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub rabbitmq_host: String,
    pub queue_name: String,
    pub publisher_pool_size: usize,
    pub temperature_bind: String,
    pub smoke_bind: String,
    pub http_bind: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_topic: String,
    pub mqtt_client_id: String,
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            rabbitmq_host: env_or("RABBITMQ_HOST", "localhost"),
            queue_name: env_or("RABBITMQ_QUEUE_NAME", "iot_queue"),
            publisher_pool_size: 4,
            temperature_bind: "0.0.0.0:65432".to_string(),
            smoke_bind: "0.0.0.0:65433".to_string(),
            http_bind: "0.0.0.0:8080".to_string(),
            mqtt_host: env_or("MQTT_BROKER", "localhost"),
            mqtt_port: 1883,
            mqtt_topic: "home/motion".to_string(),
            mqtt_client_id: "subscriber".to_string(),
        }
    }

    pub fn amqp_uri(&self) -> String {
        iotqueue::amqp_uri(&self.rabbitmq_host)
    }

    pub fn topic_subscriber(&self) -> TopicSubscriberConfig {
        TopicSubscriberConfig {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            topic: self.mqtt_topic.clone(),
            client_id: self.mqtt_client_id.clone(),
            keep_alive_secs: 30,
        }
    }
}

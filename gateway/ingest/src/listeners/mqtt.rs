//! MQTT topic subscriber for the motion sensor feed.
//!
//! One persistent broker session; every message on the topic is decoded
//! as an ASCII decimal and published as a motion envelope. Reconnection
//! is left to the client: a poll error gets a short backoff and the next
//! poll re-establishes the session.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use iotqueue::{Envelope, Publish};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct TopicSubscriberConfig {
    pub host: String,
    pub port: u16,
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
}

pub struct TopicSubscriber {
    client: AsyncClient,
    eventloop: EventLoop,
    topic: String,
}

impl TopicSubscriber {
    pub fn connect(cfg: TopicSubscriberConfig) -> Self {
        let mut opts = MqttOptions::new(&cfg.client_id, &cfg.host, cfg.port);
        opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(opts, 50);

        Self {
            client,
            eventloop,
            topic: cfg.topic,
        }
    }

    /// Subscribe and pump the event loop until shutdown.
    pub async fn run(mut self, publisher: Arc<dyn Publish>, shutdown: CancellationToken) -> Result<()> {
        self.client
            .subscribe(&self.topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("subscribe failed for '{}'", self.topic))?;
        info!("subscribed to mqtt topic '{}'", self.topic);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("mqtt subscriber shutting down");
                    return Ok(());
                }

                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match decode_motion(&publish.payload) {
                            Ok(envelope) => {
                                if let Err(e) = publisher.publish(&envelope).await {
                                    warn!("motion publish failed: {e}");
                                }
                            }
                            Err(payload) => {
                                warn!("dropped non-numeric motion payload: '{payload}'");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("mqtt poll error: {e} (retrying)");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                },
            }
        }
    }
}

/// Motion state arrives as an ASCII decimal (0 or 1 in practice). The
/// error side carries the offending payload for the log line.
fn decode_motion(payload: &[u8]) -> Result<Envelope, String> {
    let text = match std::str::from_utf8(payload) {
        Ok(t) => t.trim(),
        Err(_) => return Err(String::from_utf8_lossy(payload).into_owned()),
    };

    text.parse::<f64>()
        .map(Envelope::motion)
        .map_err(|_| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_motion_states() {
        assert_eq!(decode_motion(b"1"), Ok(Envelope::motion(1.0)));
        assert_eq!(decode_motion(b"0"), Ok(Envelope::motion(0.0)));
        assert_eq!(decode_motion(b" 1\n"), Ok(Envelope::motion(1.0)));
    }

    #[test]
    fn rejects_non_numeric_payloads() {
        assert_eq!(decode_motion(b"on"), Err("on".to_string()));
        assert!(decode_motion(&[0xff]).is_err());
    }
}

//! Queue-draining dispatcher.
//!
//! Per delivery: decode, route by device, coerce values, persist. Any
//! failure along the way drops only that delivery — the message was
//! already acked by the broker, so a drop is final and gets logged.
//! Decoded readings cross a bounded channel to the persistence worker,
//! which gives the consume loop back-pressure when the database lags.

use std::sync::Arc;

use anyhow::Result;
use iotqueue::{Envelope, QueueConsumer, RawReading};
use postgresdb::SensorStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::router::{Destination, StoreRouter};

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("failed to decode message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("message has no device field")]
    MissingDevice,

    #[error("no destination for device '{0}'")]
    UnknownDevice(String),

    #[error(transparent)]
    Codec(#[from] iotqueue::CodecError),
}

/// A reading that passed decoding and routing, ready to persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Routed {
    pub envelope: Envelope,
    pub table: &'static str,
}

/// Decode → route → coerce, the dispatcher's per-delivery pipeline.
/// Value fields are only touched after the device is known.
pub fn prepare(payload: &[u8], router: &StoreRouter) -> Result<Routed, DispatchError> {
    let raw = RawReading::decode(payload)?;

    let device = raw.device.as_deref().ok_or(DispatchError::MissingDevice)?;
    let Destination { device, table } = router
        .destination(device)
        .ok_or_else(|| DispatchError::UnknownDevice(device.to_string()))?;

    let envelope = Envelope::from_raw(device, &raw)?;

    Ok(Routed { envelope, table })
}

pub struct Dispatcher {
    router: StoreRouter,
    store: Arc<SensorStore>,
    work_capacity: usize,
}

impl Dispatcher {
    pub fn new(store: Arc<SensorStore>, work_capacity: usize) -> Self {
        Self {
            router: StoreRouter::new(),
            store,
            work_capacity,
        }
    }

    /// Drain the queue until shutdown. One poison message costs only
    /// itself: every drop condition is logged and the loop moves on.
    pub async fn run(self, mut consumer: QueueConsumer, shutdown: CancellationToken) -> Result<()> {
        let (work_tx, work_rx) = mpsc::channel::<Routed>(self.work_capacity);
        let worker = tokio::spawn(persist_worker(work_rx, self.store.clone()));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("dispatcher shutting down");
                    break;
                }

                delivery = consumer.next() => match delivery {
                    Some(payload) => match prepare(&payload, &self.router) {
                        Ok(routed) => {
                            // Bounded send: blocks when the worker lags.
                            if work_tx.send(routed).await.is_err() {
                                error!("persistence worker gone, stopping dispatcher");
                                break;
                            }
                        }
                        Err(e) => warn!("dropped delivery: {e}"),
                    },
                    None => {
                        warn!("queue consumer stream ended");
                        break;
                    }
                },
            }
        }

        drop(work_tx);
        if let Err(e) = worker.await {
            error!("persistence worker panicked: {e}");
        }

        Ok(())
    }
}

/// Persists routed readings. An insert failure lands after the broker
/// ack, so the reading is permanently lost — accepted trade-off, always
/// logged.
async fn persist_worker(mut rx: mpsc::Receiver<Routed>, store: Arc<SensorStore>) {
    while let Some(routed) = rx.recv().await {
        if let Err(e) = store
            .insert_reading(routed.table, &routed.envelope)
            .await
        {
            error!(
                "{} reading lost: insert into {} failed: {e}",
                routed.envelope.device(),
                routed.table
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router() -> StoreRouter {
        StoreRouter::new()
    }

    #[test]
    fn temperature_delivery_routes_to_its_table() {
        let routed = prepare(
            br#"{"device": "temperature_sensor", "value": 23.45}"#,
            &router(),
        )
        .unwrap();

        assert_eq!(routed.envelope, Envelope::temperature(23.45));
        assert_eq!(routed.table, "temperature_sensor_data");
    }

    #[test]
    fn smoke_delivery_carries_both_values() {
        let routed = prepare(
            br#"{"device": "smoke_sensor", "value1": 0.123, "value2": 0.045}"#,
            &router(),
        )
        .unwrap();

        assert_eq!(routed.envelope, Envelope::smoke(0.123, 0.045));
        assert_eq!(routed.table, "smoke_sensor_data");
    }

    #[test]
    fn unknown_device_is_dropped_without_destination() {
        let err = prepare(
            br#"{"device": "unknown_sensor", "value": 1.0}"#,
            &router(),
        )
        .unwrap_err();

        assert!(matches!(err, DispatchError::UnknownDevice(d) if d == "unknown_sensor"));
    }

    #[test]
    fn invalid_json_is_dropped() {
        let err = prepare(br#"{not json"#, &router()).unwrap_err();
        assert!(matches!(err, DispatchError::Decode(_)));
    }

    #[test]
    fn missing_device_is_dropped() {
        let err = prepare(br#"{"value": 1.0}"#, &router()).unwrap_err();
        assert!(matches!(err, DispatchError::MissingDevice));
    }

    #[test]
    fn non_numeric_value_is_dropped_not_fatal() {
        let err = prepare(
            br#"{"device": "motion_sensor", "value": {"nested": true}}"#,
            &router(),
        )
        .unwrap_err();

        assert!(matches!(err, DispatchError::Codec(_)));
    }

    #[test]
    fn numeric_strings_are_coerced() {
        let routed = prepare(
            br#"{"device": "humidity_sensor", "value": "55.5"}"#,
            &router(),
        )
        .unwrap();

        assert_eq!(routed.envelope, Envelope::humidity(55.5));
    }
}

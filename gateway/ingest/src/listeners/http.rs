//! HTTP ingestion endpoint for humidity readings.
//!
//! One operation: `POST /humidity` with `{"data": <number>}`. Success
//! means the reading was handed to the publisher, nothing more — the
//! response does not wait for persistence. No range validation.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use iotqueue::{Envelope, Publish};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Handler dependencies, built once at startup and injected through
/// axum state. Nothing is looked up from ambient globals.
pub struct ApiState {
    pub publisher: Arc<dyn Publish>,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct HumidityReading {
    pub data: f64,
}

#[derive(serde::Serialize)]
struct AckResponse {
    message: String,
    data: f64,
}

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

async fn receive_humidity(
    State(state): State<Arc<ApiState>>,
    Json(reading): Json<HumidityReading>,
) -> Response {
    match state
        .publisher
        .publish(&Envelope::humidity(reading.data))
        .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(AckResponse {
                message: "Data received".to_string(),
                data: reading.data,
            }),
        )
            .into_response(),
        Err(e) => {
            warn!("humidity publish failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/humidity", post(receive_humidity))
        .with_state(state)
}

pub async fn serve(bind_addr: String, state: Arc<ApiState>, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding http endpoint on {bind_addr}"))?;
    info!("http endpoint listening on {bind_addr}");

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("http endpoint failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use iotqueue::PublishError;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingPublisher {
        seen: Mutex<Vec<Envelope>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Publish for RecordingPublisher {
        async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::PoolClosed);
            }
            self.seen.lock().await.push(envelope.clone());
            Ok(())
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn humidity_reading_is_acked_and_published() {
        let publisher = Arc::new(RecordingPublisher::default());
        let state = Arc::new(ApiState {
            publisher: publisher.clone(),
        });

        let response =
            receive_humidity(State(state), Json(HumidityReading { data: 55.5 })).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["message"], "Data received");
        assert_eq!(body["data"], 55.5);

        let seen = publisher.seen.lock().await.clone();
        assert_eq!(seen, vec![Envelope::humidity(55.5)]);
    }

    #[tokio::test]
    async fn publish_failure_maps_to_500() {
        let publisher = Arc::new(RecordingPublisher {
            fail: true,
            ..Default::default()
        });
        let state = Arc::new(ApiState { publisher });

        let response =
            receive_humidity(State(state), Json(HumidityReading { data: 1.0 })).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert!(body["error"].is_string());
    }
}

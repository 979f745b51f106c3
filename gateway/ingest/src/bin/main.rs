use std::sync::Arc;

use anyhow::{Context, Result};
use ingest_gateway::listeners::http;
use ingest_gateway::{
    GatewayConfig, SensorFamily, StreamListener, StreamListenerConfig, TopicSubscriber,
};
use iotqueue::{Publish, PublisherPool, PublisherPoolConfig};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cfg = GatewayConfig::from_env();
    info!(
        "starting ingest gateway: queue '{}' via broker '{}'",
        cfg.queue_name, cfg.rabbitmq_host
    );

    // No outbound channel, no gateway.
    let pool = PublisherPool::connect(PublisherPoolConfig {
        uri: cfg.amqp_uri(),
        queue: cfg.queue_name.clone(),
        pool_size: cfg.publisher_pool_size,
    })
    .await
    .context("connecting publisher pool to the queue broker")?;
    let publisher: Arc<dyn Publish> = Arc::new(pool);

    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    let temperature = StreamListener::bind(StreamListenerConfig {
        bind_addr: cfg.temperature_bind.clone(),
        family: SensorFamily::Temperature,
    })
    .await?;
    tasks.push(tokio::spawn(
        temperature.run(publisher.clone(), shutdown.clone()),
    ));

    let smoke = StreamListener::bind(StreamListenerConfig {
        bind_addr: cfg.smoke_bind.clone(),
        family: SensorFamily::Smoke,
    })
    .await?;
    tasks.push(tokio::spawn(smoke.run(publisher.clone(), shutdown.clone())));

    let subscriber = TopicSubscriber::connect(cfg.topic_subscriber());
    tasks.push(tokio::spawn(
        subscriber.run(publisher.clone(), shutdown.clone()),
    ));

    let api_state = Arc::new(http::ApiState {
        publisher: publisher.clone(),
    });
    tasks.push(tokio::spawn(http::serve(
        cfg.http_bind.clone(),
        api_state,
        shutdown.clone(),
    )));

    info!("gateway up; Ctrl+C to stop");
    tokio::signal::ctrl_c().await.context("waiting for ctrl_c")?;

    info!("shutting down");
    shutdown.cancel();

    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("listener exited with error: {e:#}"),
            Err(e) => error!("listener task panicked: {e}"),
        }
    }

    Ok(())
}

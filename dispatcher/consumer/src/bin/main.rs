use std::sync::Arc;

use anyhow::{Context, Result};
use dispatch_consumer::{Dispatcher, DispatcherConfig};
use iotqueue::{QueueConsumer, QueueConsumerConfig};
use postgresdb::SensorStore;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cfg = DispatcherConfig::from_env();
    info!(
        "starting dispatcher: queue '{}' via broker '{}'",
        cfg.queue_name, cfg.rabbitmq_host
    );

    let store = Arc::new(
        SensorStore::connect(&cfg.database_url)
            .await
            .context("connecting to postgres")?,
    );

    let consumer = QueueConsumer::subscribe(QueueConsumerConfig {
        uri: cfg.amqp_uri(),
        queue: cfg.queue_name.clone(),
        consumer_tag: cfg.consumer_tag.clone(),
    })
    .await
    .context("subscribing to the queue broker")?;

    info!("listening for messages on '{}'", cfg.queue_name);

    let shutdown = CancellationToken::new();
    let dispatcher = Dispatcher::new(store, cfg.work_capacity);
    let task = tokio::spawn(dispatcher.run(consumer, shutdown.clone()));

    tokio::signal::ctrl_c().await.context("waiting for ctrl_c")?;

    info!("shutting down");
    shutdown.cancel();

    task.await.context("dispatcher task join")??;

    Ok(())
}

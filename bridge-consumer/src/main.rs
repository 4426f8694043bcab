//! Poll a remote store and dispatch fetched items as work units.
use std::sync::Arc;

use envconfig::Envconfig;
use tokio::sync::watch;

use bridge_common::liveness::{liveness_router, Liveness};
use bridge_common::metrics::{serve, setup_metrics_router};
use bridge_common::remote::HttpRemoteClient;
use bridge_consumer::config::Config;
use bridge_consumer::consumer::{BatchPollConsumer, ConsumerOptions};
use bridge_consumer::error::ConsumerError;
use bridge_consumer::forward::HttpForwardPipeline;

#[tokio::main]
async fn main() -> Result<(), ConsumerError> {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("Invalid configuration:");

    let liveness = Liveness::new(
        &config.consumer_name,
        ::time::Duration::seconds(config.liveness_deadline_seconds),
    );

    let client = Arc::new(HttpRemoteClient::new(
        config.source_url.as_str(),
        config.request_timeout.0,
    )?);
    let pipeline = Arc::new(HttpForwardPipeline::new(
        config.sink_url.as_str(),
        config.request_timeout.0,
    )?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::task::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_tx.send(true).ok();
        }
    });

    let bind = config.bind();
    let probe = liveness.clone();
    tokio::task::spawn(async move {
        let router = setup_metrics_router().merge(liveness_router(probe));
        serve(router, &bind)
            .await
            .expect("failed to start serving metrics");
    });

    let options = ConsumerOptions {
        poll_interval: config.poll_interval.0,
        batch_limit: config.batch_limit,
        max_in_flight: config.max_in_flight,
        deduplicate: config.deduplicate,
        cleanup_on_success: config.cleanup_on_success,
        fingerprint_capacity: config.fingerprint_capacity,
    };
    let mut consumer = BatchPollConsumer::new(
        &config.consumer_name,
        client,
        pipeline,
        options,
        liveness,
        shutdown_rx,
    );

    consumer.run().await?;

    Ok(())
}

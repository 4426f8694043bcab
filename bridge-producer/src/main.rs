//! Serve operation invocations against the remote store.
use std::sync::Arc;

use axum::Router;
use envconfig::Envconfig;
use eyre::Result;

use bridge_common::metrics::setup_metrics_recorder;
use bridge_common::remote::HttpRemoteClient;

use config::Config;
use handlers::operations::AppState;
use table::OperationTable;

mod config;
mod handlers;
mod table;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = Config::init_from_env().expect("failed to load configuration from env");
    let bind = config.bind();

    let client = Arc::new(
        HttpRemoteClient::new(&config.remote_url, config.request_timeout.0)
            .expect("failed to construct remote store client"),
    );

    let table = Arc::new(OperationTable::new());
    table
        .registry()
        .validate_defaults(&config.endpoint_defaults.0)
        .expect("endpoint defaults do not match the operation table");

    let state = AppState {
        table,
        client,
        endpoint_defaults: Arc::new(config.endpoint_defaults.0),
    };

    let recorder_handle = setup_metrics_recorder();
    let app = handlers::app::app(state, Some(recorder_handle));

    match listen(app, bind).await {
        Ok(_) => {}
        Err(e) => tracing::error!("failed to start bridge-producer http server, {}", e),
    }
}

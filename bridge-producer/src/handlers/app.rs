use axum::{routing, Router};
use metrics_exporter_prometheus::PrometheusHandle;

use bridge_common::client::RemoteClient;
use bridge_common::metrics;
use bridge_common::remote::SourceRecord;

use super::operations::{self, AppState};

pub fn app<C>(state: AppState<C>, metrics_handle: Option<PrometheusHandle>) -> Router
where
    C: RemoteClient<Item = SourceRecord> + 'static,
{
    Router::new()
        .route("/", routing::get(index))
        .route(
            "/metrics",
            routing::get(move || match metrics_handle {
                Some(ref recorder_handle) => std::future::ready(recorder_handle.render()),
                None => std::future::ready("no metrics recorder installed".to_owned()),
            }),
        )
        .route(
            "/operations/:name",
            routing::post(operations::post::<C>).with_state(state),
        )
        .layer(axum::middleware::from_fn(metrics::track_metrics))
}

pub async fn index() -> &'static str {
    "bridge producer"
}

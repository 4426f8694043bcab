use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_derive::Deserialize;
use tracing::{debug, error};

use bridge_common::client::{FetchQuery, RemoteClient};
use bridge_common::operation::RegistryError;
use bridge_common::params::{ParamValue, ResolvedParameters};
use bridge_common::remote::SourceRecord;

use crate::table::{OperationTable, RemoteOp};

/// Shared state for the operation handlers: the operation table, the remote
/// store client, and the endpoint-level parameter defaults.
pub struct AppState<C: RemoteClient> {
    pub table: Arc<OperationTable>,
    pub client: Arc<C>,
    pub endpoint_defaults: Arc<HashMap<String, ParamValue>>,
}

impl<C: RemoteClient> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            client: self.client.clone(),
            endpoint_defaults: self.endpoint_defaults.clone(),
        }
    }
}

/// The body of a request to invoke an operation. `headers` carries message
/// header overrides, `parameters` the per-call configuration; endpoint
/// defaults come from the producer's own configuration. Headers win.
#[derive(Deserialize, Serialize, Debug, Default, PartialEq, Clone)]
pub struct OperationPostRequestBody {
    #[serde(default)]
    pub headers: HashMap<String, ParamValue>,
    #[serde(default)]
    pub parameters: HashMap<String, ParamValue>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OperationPostResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<SourceRecord>>,
}

impl OperationPostResponse {
    fn ok() -> Json<Self> {
        Json(Self {
            error: None,
            items: None,
        })
    }

    fn with_items(items: Vec<SourceRecord>) -> Json<Self> {
        Json(Self {
            error: None,
            items: Some(items),
        })
    }
}

pub async fn post<C>(
    State(state): State<AppState<C>>,
    Path(name): Path<String>,
    Json(payload): Json<OperationPostRequestBody>,
) -> Result<Json<OperationPostResponse>, (StatusCode, Json<OperationPostResponse>)>
where
    C: RemoteClient<Item = SourceRecord> + 'static,
{
    debug!("received invocation of {}: {:?}", name, payload);

    let registry = state.table.registry();
    let operation = registry.resolve(&name).map_err(not_found)?;

    registry
        .validate(operation, &payload.headers)
        .map_err(bad_request)?;
    registry
        .validate(operation, &payload.parameters)
        .map_err(bad_request)?;

    let resolved = ResolvedParameters::resolve(
        operation.parameters(),
        &payload.headers,
        &payload.parameters,
        &state.endpoint_defaults,
    )
    .map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(OperationPostResponse {
                error: Some(e.to_string()),
                items: None,
            }),
        )
    })?;

    let handler = state
        .table
        .handler(&name)
        .ok_or_else(|| internal_error(&format!("{} has no bound handler", name)))?;

    let start_time = Instant::now();
    let labels = [("operation", name.clone())];

    let response = match handler {
        RemoteOp::Put => {
            let key = require(&resolved, "key", &name)?;
            let raw = require(&resolved, "payload", &name)?;
            // The payload parameter carries either a JSON document or a bare
            // string value.
            let payload = serde_json::from_str(&raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.clone()));

            state
                .client
                .put(SourceRecord { key, payload })
                .await
                .map_err(client_error)?;

            OperationPostResponse::ok()
        }
        RemoteOp::Delete => {
            let key = require(&resolved, "key", &name)?;

            state.client.delete(&key).await.map_err(client_error)?;

            OperationPostResponse::ok()
        }
        RemoteOp::Query => {
            let mut query = FetchQuery::default();
            if let Some(limit) = resolved.integer("maxResults") {
                // We could cast, but this rejects negative limits instead of
                // wrapping them.
                let limit = usize::try_from(limit).map_err(|_| {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(OperationPostResponse {
                            error: Some("maxResults must not be negative".to_owned()),
                            items: None,
                        }),
                    )
                })?;
                query.limit = Some(limit);
            }

            let items = state.client.fetch(&query).await.map_err(client_error)?;

            OperationPostResponse::with_items(items)
        }
    };

    metrics::counter!("operations_invoked_total", &labels).increment(1);
    metrics::histogram!("operation_duration_seconds", &labels)
        .record(start_time.elapsed().as_secs_f64());

    Ok(response)
}

/// Pull a required parameter out of an already-resolved set. Resolution has
/// checked requiredness, so a miss here means the table and the handler
/// disagree about the operation's declaration.
fn require(
    resolved: &ResolvedParameters,
    parameter: &str,
    operation: &str,
) -> Result<String, (StatusCode, Json<OperationPostResponse>)> {
    resolved
        .string(parameter)
        .map(|s| s.to_owned())
        .ok_or_else(|| internal_error(&format!("{} resolved without {}", operation, parameter)))
}

fn not_found(err: RegistryError) -> (StatusCode, Json<OperationPostResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(OperationPostResponse {
            error: Some(err.to_string()),
            items: None,
        }),
    )
}

fn bad_request(err: RegistryError) -> (StatusCode, Json<OperationPostResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(OperationPostResponse {
            error: Some(err.to_string()),
            items: None,
        }),
    )
}

fn client_error<E>(err: E) -> (StatusCode, Json<OperationPostResponse>)
where
    E: std::error::Error,
{
    error!("remote store call failed: {}", err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(OperationPostResponse {
            error: Some(err.to_string()),
            items: None,
        }),
    )
}

fn internal_error(reason: &str) -> (StatusCode, Json<OperationPostResponse>) {
    error!("internal error: {}", reason);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(OperationPostResponse {
            error: Some(reason.to_owned()),
            items: None,
        }),
    )
}

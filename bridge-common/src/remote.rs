use std::time;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::client::{ClientError, FetchQuery, RemoteClient, SourceItem};

/// Enumeration of errors raised while constructing an `HttpRemoteClient`.
/// Construction failures are fatal: the route never starts.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("error parsing remote store url")]
    ParseUrlError(#[from] url::ParseError),
}

/// One item as exposed by an HTTP-backed remote store: a stable key plus an
/// arbitrary JSON payload.
#[derive(Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct SourceRecord {
    pub key: String,
    pub payload: serde_json::Value,
}

impl SourceItem for SourceRecord {
    fn key(&self) -> &str {
        &self.key
    }
}

/// A `RemoteClient` over a plain JSON-over-HTTP store:
/// `GET {base}` returns the pending items, `DELETE {base}/{key}` removes one,
/// `PUT {base}/{key}` writes one.
pub struct HttpRemoteClient {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpRemoteClient {
    pub fn new(base_url: &str, request_timeout: time::Duration) -> Result<Self, BuildError> {
        let base_url = Url::parse(base_url)?;

        let client = reqwest::Client::builder()
            .user_agent("bridge remote client")
            .timeout(request_timeout)
            .build()
            .expect("failed to construct reqwest client for remote store");

        Ok(Self { client, base_url })
    }

    fn item_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url.as_str().trim_end_matches('/'), key)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    type Item = SourceRecord;

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<SourceRecord>, ClientError> {
        let mut request = self.client.get(self.base_url.clone());
        if let Some(limit) = query.limit {
            request = request.query(&[("limit", limit.to_string())]);
        }

        let response = request
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ClientError::Fetch {
                reason: e.to_string(),
            })?;

        response
            .json::<Vec<SourceRecord>>()
            .await
            .map_err(|e| ClientError::Fetch {
                reason: format!("reading the fetch response body: {}", e),
            })
    }

    async fn delete(&self, key: &str) -> Result<(), ClientError> {
        self.client
            .delete(self.item_url(key))
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ClientError::Delete {
                key: key.to_owned(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    async fn put(&self, item: SourceRecord) -> Result<(), ClientError> {
        self.client
            .put(self.item_url(&item.key))
            .json(&item.payload)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| ClientError::Put {
                key: item.key.clone(),
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

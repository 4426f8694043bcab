use std::time;

use async_trait::async_trait;
use bridge_common::batch::WorkUnit;
use bridge_common::pipeline::{PipelineError, ProcessingPipeline};
use bridge_common::remote::{BuildError, SourceRecord};
use http::StatusCode;
use url::Url;

/// A processing pipeline that forwards each work unit's payload to a sink
/// URL over HTTP, carrying the batch metadata in headers so the downstream
/// side can run its own aggregation or completion logic.
pub struct HttpForwardPipeline {
    client: reqwest::Client,
    sink_url: Url,
}

impl HttpForwardPipeline {
    pub fn new(sink_url: &str, request_timeout: time::Duration) -> Result<Self, BuildError> {
        let sink_url = Url::parse(sink_url)?;

        let client = reqwest::Client::builder()
            .user_agent("bridge consumer")
            .timeout(request_timeout)
            .build()
            .expect("failed to construct reqwest client for the forwarding pipeline");

        Ok(Self { client, sink_url })
    }
}

#[async_trait]
impl ProcessingPipeline<SourceRecord> for HttpForwardPipeline {
    async fn process(&self, unit: WorkUnit<SourceRecord>) -> Result<(), PipelineError> {
        let response = self
            .client
            .post(self.sink_url.clone())
            .header("x-item-key", unit.item.key.as_str())
            .header("x-batch-index", unit.metadata.index.to_string())
            .header("x-batch-size", unit.metadata.size.to_string())
            .header("x-batch-complete", unit.metadata.is_last.to_string())
            .header("x-exchange-id", unit.metadata.exchange_id.to_string())
            .json(&unit.item.payload)
            .send()
            .await
            .map_err(|e| PipelineError::Retryable {
                reason: e.to_string(),
                retry_after: None,
            })?;

        let retry_after = parse_retry_after_header(response.headers());

        match response.error_for_status() {
            Ok(_) => Ok(()),
            Err(err) => {
                let status = err
                    .status()
                    .expect("status code is set as error is generated from a response");
                if is_retryable_status(status) {
                    Err(PipelineError::Retryable {
                        reason: err.to_string(),
                        retry_after,
                    })
                } else {
                    Err(PipelineError::NonRetryable {
                        reason: err.to_string(),
                    })
                }
            }
        }
    }
}

/// A status indicates retrying at a later point could resolve the issue when
/// it is 429 or any 5XX.
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Attempt to read a duration from a Retry-After response header.
/// The header can carry a number of seconds or an RFC2822 date; both are
/// tried, and anything else (including a date in the past) yields `None`.
fn parse_retry_after_header(header_map: &reqwest::header::HeaderMap) -> Option<time::Duration> {
    let retry_after = header_map
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?;

    if let Ok(seconds) = retry_after.parse::<u64>() {
        return Some(time::Duration::from_secs(seconds));
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(retry_after) {
        let until = chrono::DateTime::<chrono::Utc>::from(dt) - chrono::Utc::now();

        // Fails only when negative, in which case there is nothing to wait for.
        return until.to_std().ok();
    }

    None
}

use std::time;

use async_trait::async_trait;
use thiserror::Error;

use crate::batch::WorkUnit;

/// Enumeration of errors raised by the processing pipeline for a single work
/// unit. The split mirrors whether retrying downstream at a later point could
/// resolve the issue; the core itself never retries, but the classification
/// and any preferred retry interval are surfaced for whoever schedules us.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("a work unit could not be processed but could be retried later: {reason}")]
    Retryable {
        reason: String,
        retry_after: Option<time::Duration>,
    },
    #[error("a work unit could not be processed and retrying would not help: {reason}")]
    NonRetryable { reason: String },
}

/// The injected processing pipeline. `process` is invoked exactly once per
/// work unit; its result drives the unit's post-processing hook. A failure
/// affects only that unit, never its batch siblings.
#[async_trait]
pub trait ProcessingPipeline<T>: Send + Sync {
    async fn process(&self, unit: WorkUnit<T>) -> Result<(), PipelineError>;
}

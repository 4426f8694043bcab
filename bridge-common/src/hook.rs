use std::sync::Arc;

use tracing::{debug, error};

use crate::client::RemoteClient;

/// A one-shot action bound to a single work unit, run after the pipeline has
/// fully finished that unit.
///
/// Exactly one of `on_complete` / `on_failure` fires per unit; both consume
/// the hook, so firing twice does not compile. `on_complete` performs the
/// bound cleanup (deleting the item from the remote store) when cleanup is
/// enabled, and a cleanup failure is logged and swallowed: it does not roll
/// back the already-successful processing of the unit. `on_failure` performs
/// no cleanup, leaving the item in the remote store for a future poll.
pub struct PostProcessingHook<C: RemoteClient> {
    client: Arc<C>,
    key: String,
    cleanup_enabled: bool,
}

impl<C: RemoteClient> PostProcessingHook<C> {
    pub fn new(client: Arc<C>, key: &str, cleanup_enabled: bool) -> Self {
        Self {
            client,
            key: key.to_owned(),
            cleanup_enabled,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The unit processed successfully; run the cleanup action.
    pub async fn on_complete(self) {
        if !self.cleanup_enabled {
            return;
        }

        if let Err(e) = self.client.delete(&self.key).await {
            // Best effort: the unit already succeeded, the leftover item will
            // be suppressed by its fingerprint on the next poll.
            error!("cleanup after {} failed: {}", self.key, e);
            metrics::counter!("cleanup_failures_total").increment(1);
        }
    }

    /// The unit failed; leave the item in place so a future poll can retry it.
    pub async fn on_failure(self) {
        debug!("leaving {} in the remote store after a processing failure", self.key);
    }
}

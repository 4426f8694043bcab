use async_trait::async_trait;
use thiserror::Error;

/// Enumeration of errors raised by a remote collaborator client.
/// These are runtime failures scoped to one call: a failed fetch aborts the
/// poll cycle it belongs to, a failed delete or put fails that invocation,
/// and the next cycle or invocation starts fresh.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("fetching from the remote store failed: {reason}")]
    Fetch { reason: String },
    #[error("deleting {key} from the remote store failed: {reason}")]
    Delete { key: String, reason: String },
    #[error("writing {key} to the remote store failed: {reason}")]
    Put { key: String, reason: String },
}

/// An item held in the remote store. The key is the item's stable identifier
/// and doubles as its fingerprint for duplicate suppression.
pub trait SourceItem {
    fn key(&self) -> &str;
}

/// Generic query parameters for a fetch. The consumer only ever caps the
/// result size; anything protocol-specific belongs to the client behind the
/// trait.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchQuery {
    pub limit: Option<usize>,
}

impl FetchQuery {
    pub fn with_limit(limit: usize) -> Self {
        Self { limit: Some(limit) }
    }
}

/// The injected remote collaborator. One consumer instance owns one client
/// and shares it read-mostly across poll cycles; the core never builds
/// protocol-specific requests itself.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    type Item: SourceItem + Send + Sync + 'static;

    async fn fetch(&self, query: &FetchQuery) -> Result<Vec<Self::Item>, ClientError>;

    async fn delete(&self, key: &str) -> Result<(), ClientError>;

    async fn put(&self, item: Self::Item) -> Result<(), ClientError>;
}

use bridge_common::client::ClientError;
use bridge_common::remote::BuildError;
use thiserror::Error;

/// Enumeration of errors for initialization and the consumer poll loop.
/// `Build` is fatal at startup; `PollFailure` is scoped to one cycle and the
/// loop ticks again after reporting it.
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("invalid remote store configuration")]
    Build(#[from] BuildError),
    #[error("the remote fetch failed and the poll cycle was aborted")]
    PollFailure(#[from] ClientError),
}

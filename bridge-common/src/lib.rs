pub mod batch;
pub mod client;
pub mod fingerprint;
pub mod hook;
pub mod liveness;
pub mod metrics;
pub mod operation;
pub mod params;
pub mod pipeline;
pub mod remote;

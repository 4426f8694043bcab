use std::collections::HashMap;

use bridge_common::operation::{Operation, OperationFlags, OperationRegistry};
use bridge_common::params::ParameterKind;

/// The remote calls this producer can make. Handlers are bound to registry
/// names once at construction, so an operation the match does not cover
/// cannot compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Put,
    Delete,
    Query,
}

/// The producer's operation registry plus its name-to-handler binding.
pub struct OperationTable {
    registry: OperationRegistry,
    handlers: HashMap<String, RemoteOp>,
}

impl OperationTable {
    pub fn new() -> Self {
        let registry = OperationRegistry::builder()
            .register(
                Operation::new("put", OperationFlags::produce())
                    .with_parameter("key", ParameterKind::String, true)
                    .with_parameter("payload", ParameterKind::String, true),
            )
            .expect("operation table is built once at startup")
            .register(
                Operation::new("delete", OperationFlags::produce())
                    .with_parameter("key", ParameterKind::String, true),
            )
            .expect("operation table is built once at startup")
            .register(
                Operation::new("query", OperationFlags::produce())
                    .with_parameter("maxResults", ParameterKind::Integer, false),
            )
            .expect("operation table is built once at startup")
            .build();

        let handlers = HashMap::from([
            ("put".to_owned(), RemoteOp::Put),
            ("delete".to_owned(), RemoteOp::Delete),
            ("query".to_owned(), RemoteOp::Query),
        ]);

        Self { registry, handlers }
    }

    pub fn registry(&self) -> &OperationRegistry {
        &self.registry
    }

    pub fn handler(&self, name: &str) -> Option<RemoteOp> {
        self.handlers.get(name).copied()
    }
}

impl Default for OperationTable {
    fn default() -> Self {
        Self::new()
    }
}

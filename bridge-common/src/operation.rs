use std::collections::HashMap;

use thiserror::Error;

use crate::params::{coerce, ParamValue, ParameterKind, ParameterSpec};

/// Enumeration of errors for operation lookup and validation.
/// `NotFound` is an invocation-time failure. The rest are configuration-time
/// failures: they are raised while building a producer or endpoint and
/// prevent that route from starting at all.
#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("{0} is not a registered operation")]
    NotFound(String),
    #[error("an operation named {0} is already registered")]
    AlreadyRegistered(String),
    #[error("operation {operation} does not declare a parameter named {parameter}")]
    UnknownParameter {
        operation: String,
        parameter: String,
    },
    #[error("operation {operation} declares {parameter} as {expected}, but {found} cannot be read as one")]
    TypeMismatch {
        operation: String,
        parameter: String,
        expected: ParameterKind,
        found: String,
    },
    #[error("no registered operation declares a parameter named {0}")]
    UnknownDefault(String),
}

/// What an operation may be used for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationFlags {
    pub can_consume: bool,
    pub can_produce: bool,
    pub is_async: bool,
}

impl OperationFlags {
    pub fn produce() -> Self {
        Self {
            can_produce: true,
            ..Default::default()
        }
    }

    pub fn consume() -> Self {
        Self {
            can_consume: true,
            ..Default::default()
        }
    }
}

/// A named remote interaction with a closed, typed parameter set.
/// Operations are declared once at startup and never change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    name: String,
    parameters: Vec<ParameterSpec>,
    flags: OperationFlags,
}

impl Operation {
    pub fn new(name: &str, flags: OperationFlags) -> Self {
        Self {
            name: name.to_owned(),
            parameters: Vec::new(),
            flags,
        }
    }

    /// Declare a parameter. Declaration order is preserved.
    pub fn with_parameter(mut self, name: &str, kind: ParameterKind, required: bool) -> Self {
        self.parameters.push(ParameterSpec::new(name, kind, required));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[ParameterSpec] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|spec| spec.name == name)
    }

    pub fn flags(&self) -> OperationFlags {
        self.flags
    }
}

/// An immutable table of operations, built once at startup.
/// Lookup and validation are pure: no side effects, no interior state.
pub struct OperationRegistry {
    operations: HashMap<String, Operation>,
}

impl OperationRegistry {
    pub fn builder() -> OperationRegistryBuilder {
        OperationRegistryBuilder {
            operations: HashMap::new(),
        }
    }

    /// Look up an operation by name.
    pub fn resolve(&self, name: &str) -> Result<&Operation, RegistryError> {
        self.operations
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_owned()))
    }

    /// Validate a set of supplied parameters against an operation's closed
    /// declaration set. Any name the operation does not declare is rejected,
    /// as is any value that cannot coerce to the declared kind.
    pub fn validate(
        &self,
        operation: &Operation,
        supplied: &HashMap<String, ParamValue>,
    ) -> Result<(), RegistryError> {
        for (name, value) in supplied {
            let spec = operation.parameter(name).ok_or_else(|| {
                RegistryError::UnknownParameter {
                    operation: operation.name().to_owned(),
                    parameter: name.clone(),
                }
            })?;

            if coerce(value, spec.kind).is_none() {
                return Err(RegistryError::TypeMismatch {
                    operation: operation.name().to_owned(),
                    parameter: name.clone(),
                    expected: spec.kind,
                    found: value.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Validate endpoint-level defaults against the whole registry. A default
    /// must name a parameter some operation declares, and its value must
    /// coerce to the declared kind wherever that name appears. This runs at
    /// startup, so a bad default stops the endpoint before it serves.
    pub fn validate_defaults(
        &self,
        defaults: &HashMap<String, ParamValue>,
    ) -> Result<(), RegistryError> {
        for (name, value) in defaults {
            let mut declared = false;

            for operation in self.operations.values() {
                if let Some(spec) = operation.parameter(name) {
                    declared = true;

                    if coerce(value, spec.kind).is_none() {
                        return Err(RegistryError::TypeMismatch {
                            operation: operation.name().to_owned(),
                            parameter: name.clone(),
                            expected: spec.kind,
                            found: value.to_string(),
                        });
                    }
                }
            }

            if !declared {
                return Err(RegistryError::UnknownDefault(name.clone()));
            }
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Builder for `OperationRegistry`. Consumed by `build` so the finished
/// registry cannot gain operations after startup.
pub struct OperationRegistryBuilder {
    operations: HashMap<String, Operation>,
}

impl OperationRegistryBuilder {
    pub fn register(mut self, operation: Operation) -> Result<Self, RegistryError> {
        if self.operations.contains_key(operation.name()) {
            return Err(RegistryError::AlreadyRegistered(
                operation.name().to_owned(),
            ));
        }

        self.operations
            .insert(operation.name().to_owned(), operation);
        Ok(self)
    }

    pub fn build(self) -> OperationRegistry {
        OperationRegistry {
            operations: self.operations,
        }
    }
}

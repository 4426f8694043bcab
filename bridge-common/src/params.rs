use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enumeration of errors raised while resolving operation parameters.
/// These are invocation-time failures: they abort the invocation that supplied
/// the offending values but do not take the route down.
#[derive(Error, Debug, PartialEq)]
pub enum ResolveError {
    #[error("required parameter {0} was not supplied by header, per-call configuration, or endpoint default")]
    MissingRequired(String),
    #[error("parameter {name} expects a {expected} but was given {found}")]
    TypeMismatch {
        name: String,
        expected: ParameterKind,
        found: String,
    },
}

/// The declared type of an operation parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    Integer,
    Boolean,
}

impl fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParameterKind::String => write!(f, "string"),
            ParameterKind::Integer => write!(f, "integer"),
            ParameterKind::Boolean => write!(f, "boolean"),
        }
    }
}

/// A single parameter declared by an `Operation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub required: bool,
}

impl ParameterSpec {
    pub fn new(name: &str, kind: ParameterKind, required: bool) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            required,
        }
    }
}

/// A typed parameter value, as supplied by a message header, per-call
/// configuration, or an endpoint default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Boolean(bool),
    Integer(i64),
    String(String),
}

impl ParamValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParamValue::String(_) => ParameterKind::String,
            ParamValue::Integer(_) => ParameterKind::Integer,
            ParamValue::Boolean(_) => ParameterKind::Boolean,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ParamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            ParamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParamValue::String(s) => write!(f, "{}", s),
            ParamValue::Integer(i) => write!(f, "{}", i),
            ParamValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Coerce a supplied value to the declared kind.
/// Strings parse to integers strictly, and to booleans only from the literal
/// set {"true", "false"} case-insensitively. A value whose kind already
/// matches passes through unchanged. Anything else is a mismatch.
pub fn coerce(value: &ParamValue, kind: ParameterKind) -> Option<ParamValue> {
    if value.kind() == kind {
        return Some(value.clone());
    }

    match (value, kind) {
        (ParamValue::String(s), ParameterKind::Integer) => {
            s.trim().parse::<i64>().ok().map(ParamValue::Integer)
        }
        (ParamValue::String(s), ParameterKind::Boolean) => {
            match s.to_ascii_lowercase().as_ref() {
                "true" => Some(ParamValue::Boolean(true)),
                "false" => Some(ParamValue::Boolean(false)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Resolve one parameter from its three layered sources.
/// Precedence: message header override, then per-call configuration, then the
/// endpoint default. A required parameter that resolves to nothing is an
/// error, never a silent null. Resolution has no hidden state: identical
/// inputs always produce identical output.
pub fn resolve(
    spec: &ParameterSpec,
    message_override: Option<&ParamValue>,
    per_call: Option<&ParamValue>,
    endpoint_default: Option<&ParamValue>,
) -> Result<Option<ParamValue>, ResolveError> {
    let candidate = message_override.or(per_call).or(endpoint_default);

    match candidate {
        Some(value) => match coerce(value, spec.kind) {
            Some(coerced) => Ok(Some(coerced)),
            None => Err(ResolveError::TypeMismatch {
                name: spec.name.clone(),
                expected: spec.kind,
                found: value.to_string(),
            }),
        },
        None if spec.required => Err(ResolveError::MissingRequired(spec.name.clone())),
        None => Ok(None),
    }
}

/// The parameters of one operation invocation, resolved and coerced.
/// Built fresh per invocation; holds only declared parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedParameters(HashMap<String, ParamValue>);

impl ResolvedParameters {
    /// Resolve every declared parameter against the three layered sources.
    pub fn resolve(
        specs: &[ParameterSpec],
        message_overrides: &HashMap<String, ParamValue>,
        per_call: &HashMap<String, ParamValue>,
        endpoint_defaults: &HashMap<String, ParamValue>,
    ) -> Result<Self, ResolveError> {
        let mut values = HashMap::with_capacity(specs.len());

        for spec in specs {
            let resolved = resolve(
                spec,
                message_overrides.get(&spec.name),
                per_call.get(&spec.name),
                endpoint_defaults.get(&spec.name),
            )?;

            if let Some(value) = resolved {
                values.insert(spec.name.clone(), value);
            }
        }

        Ok(Self(values))
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.as_str())
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(|v| v.as_integer())
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(|v| v.as_boolean())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

//! Capability provider seam.
//!
//! The core does not know how an operation computes its result; it only
//! invokes a named operation with a task's parameters and observes the
//! outcome. Transport and connection setup for a real provider live outside
//! this crate.

pub mod builtin;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ProviderError;

pub use builtin::BuiltinProvider;

/// External operation provider.
///
/// `Err(ProviderError)` is a fault and is retried by the agent layer. An
/// `Ok` payload is a business result, even when the payload itself
/// describes a domain-level error.
#[async_trait]
pub trait CapabilityProvider: Send + Sync {
    /// Invoke a named operation with the given arguments.
    async fn invoke(
        &self,
        operation: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ProviderError>;
}

/// Extract a required string argument.
pub fn require_str<'a>(
    arguments: &'a Map<String, Value>,
    operation: &str,
    key: &str,
) -> Result<&'a str, ProviderError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::InvalidArguments {
            operation: operation.to_string(),
            reason: format!("missing or non-string parameter: {key}"),
        })
}

/// Extract a required numeric argument.
pub fn require_f64(
    arguments: &Map<String, Value>,
    operation: &str,
    key: &str,
) -> Result<f64, ProviderError> {
    arguments
        .get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| ProviderError::InvalidArguments {
            operation: operation.to_string(),
            reason: format!("missing or non-numeric parameter: {key}"),
        })
}

/// Extract an optional string argument with a default.
pub fn optional_str<'a>(arguments: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
    arguments.get(key).and_then(Value::as_str).unwrap_or(default)
}

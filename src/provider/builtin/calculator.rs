//! Basic arithmetic operations.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::error::ProviderError;
use crate::provider::{CapabilityProvider, require_f64, require_str};

/// Calculator over two operands: add, subtract, multiply, divide.
///
/// Division by zero is a domain-level error: it returns a successful
/// invocation whose payload carries an `error` field, and is never retried.
pub struct CalculatorProvider;

#[async_trait]
impl CapabilityProvider for CalculatorProvider {
    async fn invoke(
        &self,
        operation: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        let op = require_str(arguments, operation, "operation")?;
        let a = require_f64(arguments, operation, "a")?;
        let b = require_f64(arguments, operation, "b")?;

        let result = match op {
            "add" => a + b,
            "subtract" => a - b,
            "multiply" => a * b,
            "divide" => {
                if b == 0.0 {
                    return Ok(json!({
                        "operation": op,
                        "a": a,
                        "b": b,
                        "error": "division by zero",
                    }));
                }
                a / b
            }
            other => {
                return Err(ProviderError::InvalidArguments {
                    operation: operation.to_string(),
                    reason: format!(
                        "invalid operation {other}; must be one of add, subtract, multiply, divide"
                    ),
                });
            }
        };

        Ok(json!({
            "operation": op,
            "a": a,
            "b": b,
            "result": result,
        }))
    }
}

//! Current-time formatting.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value, json};

use crate::error::ProviderError;
use crate::provider::{CapabilityProvider, optional_str};

/// Current timestamp in iso, unix, or human format.
pub struct ClockProvider;

#[async_trait]
impl CapabilityProvider for ClockProvider {
    async fn invoke(
        &self,
        _operation: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        let format = optional_str(arguments, "format", "iso");
        let now = Utc::now();

        let value = match format {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            "human" => now.format("%Y-%m-%d %H:%M:%S").to_string(),
            other => {
                return Ok(json!({
                    "error": format!("invalid format {other}; use iso, unix, or human"),
                }));
            }
        };

        Ok(json!({
            "format": format,
            "timestamp": value,
        }))
    }
}

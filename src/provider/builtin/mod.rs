//! In-process capability providers for demos and tests.

pub mod calculator;
pub mod clock;
pub mod files;
pub mod weather;

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::ProviderError;
use crate::provider::CapabilityProvider;

pub use calculator::CalculatorProvider;
pub use clock::ClockProvider;
pub use files::FileOperationsProvider;
pub use weather::WeatherProvider;

/// Facade routing the built-in operation names to their providers.
///
/// Operations: `calculator`, `file_operations`, `weather`, `timestamp`.
/// Unknown names are a fault, not a business error.
pub struct BuiltinProvider {
    calculator: CalculatorProvider,
    files: FileOperationsProvider,
    weather: WeatherProvider,
    clock: ClockProvider,
}

impl BuiltinProvider {
    /// Create a builtin provider with file operations rooted at `base_dir`.
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            calculator: CalculatorProvider,
            files: FileOperationsProvider::new(base_dir),
            weather: WeatherProvider,
            clock: ClockProvider,
        }
    }
}

#[async_trait]
impl CapabilityProvider for BuiltinProvider {
    async fn invoke(
        &self,
        operation: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        match operation {
            "calculator" => self.calculator.invoke(operation, arguments).await,
            "file_operations" => self.files.invoke(operation, arguments).await,
            "weather" => self.weather.invoke(operation, arguments).await,
            "timestamp" => self.clock.invoke(operation, arguments).await,
            other => Err(ProviderError::UnknownOperation {
                operation: other.to_string(),
            }),
        }
    }
}

//! Simulated weather lookups.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde_json::{Map, Value, json};

use crate::error::ProviderError;
use crate::provider::{CapabilityProvider, optional_str, require_str};

const CONDITIONS: &[&str] = &["Sunny", "Cloudy", "Rainy", "Partly Cloudy", "Windy"];

/// Simulated weather for a city, in celsius or fahrenheit.
pub struct WeatherProvider;

#[async_trait]
impl CapabilityProvider for WeatherProvider {
    async fn invoke(
        &self,
        operation: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ProviderError> {
        let city = require_str(arguments, operation, "city")?;
        let units = optional_str(arguments, "units", "celsius");

        let (temp_c, condition, humidity, wind) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(-10..=35),
                CONDITIONS[rng.gen_range(0..CONDITIONS.len())],
                rng.gen_range(30..=90),
                rng.gen_range(5..=30),
            )
        };

        let (temp, unit) = match units {
            "fahrenheit" => (f64::from(temp_c) * 9.0 / 5.0 + 32.0, "°F"),
            _ => (f64::from(temp_c), "°C"),
        };

        Ok(json!({
            "city": city,
            "temperature": format!("{temp:.1}{unit}"),
            "condition": condition,
            "humidity": format!("{humidity}%"),
            "wind_speed": format!("{wind} km/h"),
            "timestamp": Utc::now().to_rfc3339(),
        }))
    }
}

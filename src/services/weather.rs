//! OpenWeatherMap current-weather client.
//!
//! Fetches live conditions for the configured city on every prediction.
//! See: https://openweathermap.org/current

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::WeatherConfig;

#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("weather request failed: {0}")]
    Request(String),

    #[error("weather API returned HTTP {0}")]
    Status(u16),

    #[error("weather JSON parse error: {0}")]
    Decode(String),

    #[error("weather response is missing '{0}'")]
    MissingField(&'static str),

    #[error("weather client is not configured: {0}")]
    Config(String),
}

/// Weather conditions in the units the model was trained on.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherSnapshot {
    /// Air temperature in Celsius
    pub temperature_c: f64,
    /// Relative humidity as a fraction in [0, 1]
    pub humidity: f64,
    /// Sea-level pressure divided by the configured reference
    pub pressure: f64,
    /// Observation time reported by the provider, when present
    pub observed_at: Option<DateTime<Utc>>,
}

// --- OpenWeatherMap JSON response types ---

#[derive(Debug, Deserialize)]
struct OwmResponse {
    main: Option<OwmMain>,
    dt: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: Option<f64>,
    humidity: Option<f64>,
    pressure: Option<f64>,
}

/// Client for the current-weather endpoint.
#[derive(Clone)]
pub struct WeatherClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    city: String,
    pressure_reference_hpa: f64,
}

impl WeatherClient {
    pub fn new(config: &WeatherConfig, pressure_reference_hpa: f64) -> Result<Self, WeatherError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| WeatherError::Config("WEATHER_API_KEY is not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WeatherError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            city: config.city.clone(),
            pressure_reference_hpa,
        })
    }

    /// Fetch current conditions. No retry and no caching.
    pub async fn fetch_current(&self) -> Result<WeatherSnapshot, WeatherError> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("q", self.city.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            // The URL carries the API key in its query string.
            .map_err(|e| WeatherError::Request(e.without_url().to_string()))?;

        if !response.status().is_success() {
            return Err(WeatherError::Status(response.status().as_u16()));
        }

        let body: OwmResponse = response
            .json()
            .await
            .map_err(|e| WeatherError::Decode(e.without_url().to_string()))?;

        let snapshot = parse_snapshot(&body, self.pressure_reference_hpa)?;
        tracing::debug!(
            "Weather for {} at {:?}: {:.1}°C humidity={:.2} pressure={:.4}",
            self.city,
            snapshot.observed_at,
            snapshot.temperature_c,
            snapshot.humidity,
            snapshot.pressure
        );
        Ok(snapshot)
    }
}

/// Map a provider response to model units.
///
/// Humidity arrives as a percentage and is clamped into [0, 1] after
/// dividing by 100; pressure arrives in hPa and is divided by the reference.
fn parse_snapshot(
    body: &OwmResponse,
    pressure_reference_hpa: f64,
) -> Result<WeatherSnapshot, WeatherError> {
    let main = body.main.as_ref().ok_or(WeatherError::MissingField("main"))?;
    let temperature_c = main.temp.ok_or(WeatherError::MissingField("main.temp"))?;
    let humidity_pct = main
        .humidity
        .ok_or(WeatherError::MissingField("main.humidity"))?;
    let pressure_hpa = main
        .pressure
        .ok_or(WeatherError::MissingField("main.pressure"))?;

    Ok(WeatherSnapshot {
        temperature_c,
        humidity: (humidity_pct / 100.0).clamp(0.0, 1.0),
        pressure: pressure_hpa / pressure_reference_hpa,
        observed_at: body.dt.and_then(|ts| DateTime::from_timestamp(ts, 0)),
    })
}

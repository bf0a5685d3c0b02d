//! HTTP forecast client with retry, exponential backoff, and timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use domain::{Climate, Coordinate};

use crate::{ClimateSource, WeatherError};

/// Default forecast endpoint (Open-Meteo).
pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Configuration for the forecast client.
#[derive(Debug, Clone)]
pub struct ForecastConfig {
    /// Full URL of the forecast endpoint.
    pub base_url: String,
    /// Timeout for a single attempt.
    pub timeout: Duration,
    /// Retries after the first attempt. Zero means a single attempt.
    pub max_retries: u32,
    /// Initial backoff duration (doubles each retry).
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Values substituted for fields the forecast does not provide.
    pub fallback: Climate,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_FORECAST_URL.to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(2),
            fallback: Climate::FALLBACK,
        }
    }
}

/// Client for the forecast service.
///
/// Cheap to clone; the underlying connection pool is shared.
#[derive(Debug, Clone)]
pub struct ForecastClient {
    client: reqwest::Client,
    config: ForecastConfig,
}

impl ForecastClient {
    /// Build a client from its configuration.
    pub fn new(config: ForecastConfig) -> Result<Self, WeatherError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| WeatherError::ClientBuild(e.to_string()))?;

        info!(
            "Forecast client targeting {} (timeout {:?}, max_retries {})",
            config.base_url, config.timeout, config.max_retries
        );
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Fetch the raw forecast document, retrying transport and 5xx failures.
    ///
    /// A successful response whose body is not JSON is returned as
    /// `Value::Null` so every field falls back individually.
    async fn fetch(&self, coordinate: Coordinate) -> Result<Value, WeatherError> {
        let query = [
            ("latitude", coordinate.latitude.to_string()),
            ("longitude", coordinate.longitude.to_string()),
            ("current_weather", "true".to_string()),
            ("hourly", "relative_humidity_2m,precipitation".to_string()),
            ("timezone", "auto".to_string()),
        ];

        let mut backoff = self.config.initial_backoff;
        let mut last_err = String::new();
        let mut attempts = 0;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                debug!(
                    "weather: retry attempt {}/{} after {:?}",
                    attempt, self.config.max_retries, backoff
                );
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.config.max_backoff);
            }
            attempts += 1;

            let response = match self
                .client
                .get(&self.config.base_url)
                .query(&query)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, attempt, "weather request failed");
                    last_err = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status.is_client_error() {
                return Err(WeatherError::Unavailable {
                    reason: format!("forecast service returned {status}"),
                    attempts,
                });
            }
            if !status.is_success() {
                warn!(%status, attempt, "weather service returned an error status");
                last_err = format!("forecast service returned {status}");
                continue;
            }

            match response.bytes().await {
                Ok(bytes) => {
                    return Ok(serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                        warn!(error = %e, "forecast body is not JSON, using fallback climate");
                        Value::Null
                    }));
                }
                Err(e) => {
                    warn!(error = %e, attempt, "failed to read forecast body");
                    last_err = e.to_string();
                }
            }
        }

        Err(WeatherError::Unavailable {
            reason: last_err,
            attempts,
        })
    }
}

#[async_trait]
impl ClimateSource for ForecastClient {
    fn name(&self) -> &str {
        "forecast"
    }

    async fn lookup(&self, coordinate: Coordinate) -> Result<Climate, WeatherError> {
        let body = self.fetch(coordinate).await?;
        let climate = resolve_climate(&body, &self.config.fallback);
        debug!(
            latitude = coordinate.latitude,
            longitude = coordinate.longitude,
            temperature = climate.temperature,
            humidity = climate.humidity,
            rainfall = climate.rainfall,
            "resolved climate"
        );
        Ok(climate)
    }
}

/// Extract climate features from a forecast document.
///
/// Reads `current_weather.temperature` and the first hourly sample of
/// `relative_humidity_2m` and `precipitation`. Each field that is absent,
/// null, or not a finite number is replaced by its fallback on its own.
pub fn resolve_climate(body: &Value, fallback: &Climate) -> Climate {
    let read = |pointer: &str| {
        body.pointer(pointer)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
    };

    let temperature = read("/current_weather/temperature");
    let humidity = read("/hourly/relative_humidity_2m/0");
    let rainfall = read("/hourly/precipitation/0");

    let missing: Vec<&str> = [
        ("temperature", temperature.is_none()),
        ("humidity", humidity.is_none()),
        ("rainfall", rainfall.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();
    if !missing.is_empty() {
        debug!("forecast missing {:?}, substituting fallback values", missing);
    }

    Climate {
        temperature: temperature.unwrap_or(fallback.temperature),
        humidity: humidity.unwrap_or(fallback.humidity),
        rainfall: rainfall.unwrap_or(fallback.rainfall),
    }
}

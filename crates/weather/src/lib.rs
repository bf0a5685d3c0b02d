//! Weather enrichment client.
//!
//! Resolves the climate features a soil sample lacks (temperature, humidity,
//! rainfall) from a public forecast service. The client handles:
//! - Building the forecast query for a coordinate
//! - Bounded retry with exponential backoff on transport and 5xx failures
//! - Field-level fallback when the forecast omits a value
//!
//! A lookup that never gets a successful response is a hard failure
//! ([`WeatherError::Unavailable`]); it does not degrade to defaults.

use async_trait::async_trait;
use thiserror::Error;

use domain::{Climate, Coordinate};

pub mod client;

pub use client::{ForecastClient, ForecastConfig, resolve_climate};

/// Errors that can occur when looking up weather for a coordinate
#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("weather service unavailable after {attempts} attempt(s): {reason}")]
    Unavailable { reason: String, attempts: u32 },

    #[error("failed to build weather HTTP client: {0}")]
    ClientBuild(String),
}

/// A source of climate readings for a coordinate.
///
/// The orchestrator only depends on this trait, so tests and alternative
/// providers can stand in for the forecast service.
#[async_trait]
pub trait ClimateSource: Send + Sync {
    /// Returns the name of this source (for logging)
    fn name(&self) -> &str;

    /// Resolve temperature, humidity, and rainfall for a coordinate.
    ///
    /// Missing fields are filled from the source's fallback climate; only a
    /// total lookup failure returns an error.
    async fn lookup(&self, coordinate: Coordinate) -> Result<Climate, WeatherError>;
}

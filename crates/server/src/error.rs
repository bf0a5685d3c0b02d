//! Request-level error taxonomy.
//!
//! Every failure anywhere in the pipeline ends the request. Each one is
//! classified into an [`ErrorKind`], which decides the HTTP status and the
//! `kind` field of the error envelope.

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

use pipeline::ValidationError;
use predictor_client::PredictorError;
use weather::WeatherError;

/// Errors that end a prediction request
#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("invalid prediction request: {0}")]
    InvalidRequest(String),

    #[error("failed to fetch weather data: {0}")]
    Weather(#[from] WeatherError),

    #[error(transparent)]
    Predictor(#[from] PredictorError),

    #[error("predictor returned an invalid result: {0}")]
    Validation(#[from] ValidationError),
}

/// Classification of a [`PredictionError`] as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    WeatherUnavailable,
    PredictorSaturated,
    PredictorSpawnFailed,
    PredictorExitNonzero,
    PredictorOutputMalformed,
    PredictorOutputOverflow,
    PredictorTimeout,
    Internal,
}

impl ErrorKind {
    /// HTTP status returned for this kind of failure.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorKind::WeatherUnavailable => StatusCode::BAD_GATEWAY,
            ErrorKind::PredictorSaturated => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::PredictorTimeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::PredictorSpawnFailed
            | ErrorKind::PredictorExitNonzero
            | ErrorKind::PredictorOutputMalformed
            | ErrorKind::PredictorOutputOverflow
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::WeatherUnavailable => "weather_unavailable",
            ErrorKind::PredictorSaturated => "predictor_saturated",
            ErrorKind::PredictorSpawnFailed => "predictor_spawn_failed",
            ErrorKind::PredictorExitNonzero => "predictor_exit_nonzero",
            ErrorKind::PredictorOutputMalformed => "predictor_output_malformed",
            ErrorKind::PredictorOutputOverflow => "predictor_output_overflow",
            ErrorKind::PredictorTimeout => "predictor_timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl PredictionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictionError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PredictionError::Weather(WeatherError::Unavailable { .. }) => {
                ErrorKind::WeatherUnavailable
            }
            PredictionError::Weather(WeatherError::ClientBuild(_)) => ErrorKind::Internal,
            PredictionError::Predictor(e) => match e {
                PredictorError::Saturated { .. } => ErrorKind::PredictorSaturated,
                PredictorError::Spawn { .. } => ErrorKind::PredictorSpawnFailed,
                PredictorError::ExitNonzero { .. } => ErrorKind::PredictorExitNonzero,
                PredictorError::OutputMalformed { .. } => ErrorKind::PredictorOutputMalformed,
                PredictorError::OutputOverflow { .. } => ErrorKind::PredictorOutputOverflow,
                PredictorError::Timeout(_) => ErrorKind::PredictorTimeout,
                PredictorError::Serialize(_) | PredictorError::Io(_) => ErrorKind::Internal,
            },
            PredictionError::Validation(_) => ErrorKind::PredictorOutputMalformed,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind().status()
    }
}

//! # Prediction Orchestrator
//!
//! This module coordinates one prediction request end to end:
//! 1. Parse the request body
//! 2. Resolve the climate for the request's coordinate (enriching mode only)
//! 3. Build the predictor input
//! 4. Run the predictor behind the admission gate
//! 5. Validate the predictor output
//!
//! Every request is an independent run. The orchestrator itself only holds
//! shared, read-only collaborators, so it is cheap to clone into handlers.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use domain::{PredictionRequest, PredictionResult};
use pipeline::{FeatureEnricher, ResponseValidator};
use predictor_client::{BoundedPredictor, Predictor, PredictorInput, ProcessPredictor};
use weather::{ClimateSource, ForecastClient};

use crate::config::ServiceConfig;
use crate::error::{ErrorKind, PredictionError};

/// Where a request currently is in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Enriching,
    Dispatching,
    Validating,
    Responded,
    Failed(ErrorKind),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Received => f.write_str("received"),
            Stage::Enriching => f.write_str("enriching"),
            Stage::Dispatching => f.write_str("dispatching"),
            Stage::Validating => f.write_str("validating"),
            Stage::Responded => f.write_str("responded"),
            Stage::Failed(kind) => write!(f, "failed({})", kind.as_str()),
        }
    }
}

/// Tracks the stage and timing of a single request.
#[derive(Debug)]
struct PipelineRun {
    stage: Stage,
    started: Instant,
}

impl PipelineRun {
    fn start() -> Self {
        debug!("stage -> {}", Stage::Received);
        Self {
            stage: Stage::Received,
            started: Instant::now(),
        }
    }

    fn advance(&mut self, next: Stage) {
        debug!(
            "stage {} -> {} after {:.2?}",
            self.stage,
            next,
            self.started.elapsed()
        );
        self.stage = next;
    }
}

/// Main orchestrator that coordinates the prediction pipeline
#[derive(Clone)]
pub struct PredictionOrchestrator {
    enricher: FeatureEnricher,
    weather: Arc<dyn ClimateSource>,
    predictor: Arc<dyn Predictor>,
    validator: ResponseValidator,
}

impl PredictionOrchestrator {
    pub fn new(
        enricher: FeatureEnricher,
        weather: Arc<dyn ClimateSource>,
        predictor: Arc<dyn Predictor>,
        validator: ResponseValidator,
    ) -> Self {
        Self {
            enricher,
            weather,
            predictor,
            validator,
        }
    }

    /// Build the production pipeline: forecast client for enrichment and a
    /// bounded process predictor for inference.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let weather = ForecastClient::new(config.forecast_config())
            .context("Failed to create weather client")?;
        let predictor = BoundedPredictor::new(
            ProcessPredictor::new(config.process_config()),
            config.predictor.max_concurrent,
            config.queue_timeout(),
        );
        let validator =
            ResponseValidator::new().require_trust_score(config.predictor.require_trust_score);

        info!(
            "Prediction pipeline ready: enrichment={}, predictor={:?}, capacity={}",
            config.enrichment.enabled,
            config.predictor.program,
            config.predictor.max_concurrent
        );

        Ok(Self::new(
            FeatureEnricher::new(config.enrichment_policy()),
            Arc::new(weather),
            Arc::new(predictor),
            validator,
        ))
    }

    pub fn enrichment_enabled(&self) -> bool {
        self.enricher.is_enabled()
    }

    pub fn predictor_capacity(&self) -> Option<usize> {
        self.predictor.capacity()
    }

    /// Main entry point: run one prediction for a request body.
    ///
    /// # Returns
    /// The validated result, or the first failure from any stage.
    pub async fn predict(&self, body: Value) -> Result<PredictionResult, PredictionError> {
        let mut run = PipelineRun::start();

        match self.run_stages(body, &mut run).await {
            Ok(result) => {
                run.advance(Stage::Responded);
                info!(
                    elapsed = ?run.started.elapsed(),
                    "prediction complete, top crop: {}",
                    result.top_crop().map(|p| p.crop.as_str()).unwrap_or("<none>")
                );
                Ok(result)
            }
            Err(e) => {
                let failed_in = run.stage;
                let kind = e.kind();
                run.advance(Stage::Failed(kind));
                if e.status().is_server_error() {
                    error!(
                        kind = kind.as_str(),
                        stage = %failed_in,
                        elapsed = ?run.started.elapsed(),
                        "prediction failed: {e}"
                    );
                } else {
                    warn!(
                        kind = kind.as_str(),
                        stage = %failed_in,
                        "prediction rejected: {e}"
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        body: Value,
        run: &mut PipelineRun,
    ) -> Result<PredictionResult, PredictionError> {
        let input = if self.enricher.is_enabled() {
            let request = parse_request(body)?;
            let coordinate = self.enricher.coordinate_for(&request);
            if !coordinate.is_valid() {
                return Err(PredictionError::InvalidRequest(format!(
                    "location ({}, {}) is outside the valid coordinate range",
                    coordinate.latitude, coordinate.longitude
                )));
            }

            run.advance(Stage::Enriching);
            let climate = self.weather.lookup(coordinate).await?;
            debug!(
                "resolved climate from {}: {:?}",
                self.weather.name(),
                climate
            );
            PredictorInput::Enriched(self.enricher.enrich(&request, climate))
        } else {
            match body {
                Value::Object(map) => PredictorInput::Raw(map),
                _ => {
                    return Err(PredictionError::InvalidRequest(
                        "request body must be a JSON object".to_string(),
                    ));
                }
            }
        };

        run.advance(Stage::Dispatching);
        let raw = self.predictor.predict(&input).await?;

        run.advance(Stage::Validating);
        let result = self.validator.validate(raw)?;
        Ok(result)
    }
}

fn parse_request(body: Value) -> Result<PredictionRequest, PredictionError> {
    if !body.is_object() {
        return Err(PredictionError::InvalidRequest(
            "request body must be a JSON object".to_string(),
        ));
    }
    serde_json::from_value(body).map_err(|e| PredictionError::InvalidRequest(e.to_string()))
}

//! Client for the external crop inference engine.
//!
//! This crate hides how inference is actually performed behind the
//! [`Predictor`] port: one structured input in, one structured document
//! (or an error) out. It provides:
//! - [`ProcessPredictor`]: runs the engine as a fresh one-shot process per call
//! - [`BoundedPredictor`]: admission control in front of any predictor
//! - [`PredictorInvocation`]: the captured result of one process run
//!
//! The process contract is a single JSON text argument in, a JSON document on
//! stdout on success, and a free-text diagnostic on stderr on failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use domain::EnrichedFeatures;

pub mod bounded;
pub mod capture;
pub mod process;

pub use bounded::BoundedPredictor;
pub use process::{ProcessConfig, ProcessPredictor, PredictorInvocation};

/// Errors that can occur when running an inference
#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("predictor is at capacity ({capacity} concurrent invocations)")]
    Saturated { capacity: usize },

    #[error("failed to serialize predictor input: {0}")]
    Serialize(String),

    #[error("failed to launch predictor `{program}`: {reason}")]
    Spawn { program: String, reason: String },

    #[error("predictor exited with {}: {stderr}", describe_exit(.code))]
    ExitNonzero { code: Option<i32>, stderr: String },

    #[error("predictor output is not valid JSON: {reason}")]
    OutputMalformed { reason: String, raw: String },

    #[error("predictor {stream} exceeded the {limit} byte capture limit")]
    OutputOverflow { stream: &'static str, limit: usize },

    #[error("predictor did not finish within {0:?}")]
    Timeout(Duration),

    #[error("I/O error while running predictor: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// What gets sent to the inference engine.
///
/// `Enriched` is the normal path; `Raw` forwards the caller's request object
/// untouched when enrichment is disabled.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PredictorInput {
    Enriched(EnrichedFeatures),
    Raw(Map<String, Value>),
}

impl PredictorInput {
    /// Serialize to the single compact JSON argument passed to the engine.
    pub fn to_argument(&self) -> Result<String, PredictorError> {
        serde_json::to_string(self).map_err(|e| PredictorError::Serialize(e.to_string()))
    }
}

/// Port for the inference engine.
///
/// Implementations must be safe to call concurrently; every call is
/// independent of every other.
#[async_trait]
pub trait Predictor: Send + Sync {
    /// Returns the name of this predictor (for logging)
    fn name(&self) -> &str;

    /// Run one inference and return the engine's structured output.
    ///
    /// The output is only guaranteed to be well-formed JSON; checking it
    /// against the result schema is the caller's job.
    async fn predict(&self, input: &PredictorInput) -> Result<Value, PredictorError>;

    /// Maximum number of concurrent inferences, if bounded.
    fn capacity(&self) -> Option<usize> {
        None
    }
}

#[async_trait]
impl<P: Predictor + ?Sized> Predictor for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn predict(&self, input: &PredictorInput) -> Result<Value, PredictorError> {
        (**self).predict(input).await
    }

    fn capacity(&self) -> Option<usize> {
        (**self).capacity()
    }
}

//! Pipeline stages around the inference call.
//!
//! This crate provides:
//! - FeatureEnricher for completing a request with climate values
//! - ResponseValidator for checking inference output before it is relayed
//!
//! ## Architecture
//! A prediction request passes through the stages in order:
//! 1. FeatureEnricher picks the coordinate to look weather up for
//! 2. The weather lookup resolves the climate (see the `weather` crate)
//! 3. FeatureEnricher merges soil values and climate into EnrichedFeatures
//! 4. The predictor runs (see the `predictor-client` crate)
//! 5. ResponseValidator turns the raw output into a PredictionResult
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{FeatureEnricher, ResponseValidator};
//!
//! let enricher = FeatureEnricher::default();
//! let coordinate = enricher.coordinate_for(&request);
//! let climate = weather.lookup(coordinate).await?;
//! let features = enricher.enrich(&request, climate);
//!
//! let raw = predictor.predict(&PredictorInput::Enriched(features)).await?;
//! let result = ResponseValidator::new().validate(raw)?;
//! ```

pub mod enrich;
pub mod validator;

// Re-export main types
pub use enrich::{EnrichmentPolicy, FeatureEnricher};
pub use validator::{ResponseValidator, ValidationError};

//! # Domain Crate
//!
//! Shared data model for the crop prediction service.
//!
//! ## Main Types
//!
//! - **PredictionRequest**: partial soil measurements plus an optional location
//! - **Climate**: temperature, humidity, and rainfall resolved for a location
//! - **EnrichedFeatures**: the complete feature vector sent to the inference engine
//! - **PredictionResult**: ranked crops, explanations, and an optional trust score
//!
//! ## Example Usage
//!
//! ```ignore
//! use domain::{Climate, PredictionRequest};
//!
//! let request: PredictionRequest = serde_json::from_str(r#"{"N": 90, "ph": 6.5}"#)?;
//! assert_eq!(request.n, Some(90.0));
//! assert_eq!(Climate::FALLBACK.humidity, 70.0);
//! ```

pub mod types;

pub use types::{
    Climate,
    Coordinate,
    CounterfactualSuggestion,
    CropPrediction,
    EnrichedFeatures,
    FeatureImpact,
    Location,
    PredictionRequest,
    PredictionResult,
    SuggestedChange,
    TrustScore,
};

//! Core domain types for crop prediction requests and results.
//!
//! The JSON field names here are part of the wire contract: the request
//! body comes from the presentation layer, the enriched features are handed
//! to the inference engine verbatim, and the result is relayed back to the
//! presentation layer. Renames must not change.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Request Types
// =============================================================================

/// Optional geographic position attached to a prediction request.
///
/// Each component may be missing independently; the enricher fills the gap
/// from the configured default coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Body of `POST /predict`.
///
/// Soil measurements are all optional; the inference engine tolerates
/// missing values and reports which were absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// Nitrogen
    #[serde(rename = "N")]
    pub n: Option<f64>,
    /// Phosphorus
    #[serde(rename = "P")]
    pub p: Option<f64>,
    /// Potassium
    #[serde(rename = "K")]
    pub k: Option<f64>,
    pub ph: Option<f64>,
    pub location: Option<Location>,
}

/// A resolved latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Reference coordinate used when a request carries no location (New Delhi).
    pub const REFERENCE: Coordinate = Coordinate {
        latitude: 28.6139,
        longitude: 77.2090,
    };

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether both components are finite and inside their valid ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl Default for Coordinate {
    fn default() -> Self {
        Self::REFERENCE
    }
}

// =============================================================================
// Climate & Feature Types
// =============================================================================

/// Climate inputs resolved for one location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Climate {
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Precipitation in millimetres
    pub rainfall: f64,
}

impl Climate {
    /// Values substituted field-by-field when the forecast omits one.
    pub const FALLBACK: Climate = Climate {
        temperature: 25.0,
        humidity: 70.0,
        rainfall: 3.0,
    };
}

impl Default for Climate {
    fn default() -> Self {
        Self::FALLBACK
    }
}

/// The complete feature vector handed to the inference engine.
///
/// Field order matches the serialized key order expected downstream:
/// `N, P, K, ph, temperature, humidity, rainfall`. Soil values the caller
/// omitted are sent as explicit `null`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnrichedFeatures {
    #[serde(rename = "N")]
    pub n: Option<f64>,
    #[serde(rename = "P")]
    pub p: Option<f64>,
    #[serde(rename = "K")]
    pub k: Option<f64>,
    pub ph: Option<f64>,
    pub temperature: f64,
    pub humidity: f64,
    pub rainfall: f64,
}

// =============================================================================
// Result Types
// =============================================================================

/// Per-feature contribution reported alongside a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImpact {
    pub feature: String,
    pub value: Option<f64>,
    pub shap: f64,
}

/// One ranked crop recommendation.
///
/// Keys the service does not model are kept in `extra` and relayed as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropPrediction {
    pub crop: String,
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_impact: Option<Vec<FeatureImpact>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CropPrediction {
    pub fn new(crop: impl Into<String>, probability: f64) -> Self {
        Self {
            crop: crop.into(),
            probability,
            rank: None,
            image_path: None,
            report: None,
            feature_impact: None,
            extra: Map::new(),
        }
    }
}

/// A single soil adjustment proposed by the counterfactual analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedChange {
    pub feature: String,
    pub current: f64,
    pub ideal: f64,
    pub change: f64,
}

/// The closest alternative crop and what it would take to grow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterfactualSuggestion {
    pub alternative_crop: Option<String>,
    pub percent_deviation: f64,
    #[serde(default)]
    pub suggested_changes: Vec<SuggestedChange>,
}

/// How far the top prediction can be trusted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    /// Enum-like label such as "High", "Medium", "Low"
    pub level: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterfactual_suggestion: Option<CounterfactualSuggestion>,
}

/// Validated output of one inference run.
///
/// `top_predictions` keeps the order emitted by the inference engine.
/// `trust_score` is optional: consumers must handle its absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub top_predictions: Vec<CropPrediction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<TrustScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_importance_path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PredictionResult {
    /// The highest ranked crop, if any prediction was returned.
    pub fn top_crop(&self) -> Option<&CropPrediction> {
        self.top_predictions.first()
    }
}

//! Schema check for inference engine output.
//!
//! The presentation layer dereferences nested fields without checking them,
//! so nothing is relayed unless it has the [`PredictionResult`] shape.

use domain::{PredictionResult, TrustScore};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Ways an inference result can fail validation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("result does not match the expected shape: {0}")]
    Shape(String),

    #[error("prediction #{index} is invalid: {reason}")]
    InvalidPrediction { index: usize, reason: String },

    #[error("trust score is invalid: {0}")]
    InvalidTrustScore(String),
}

/// Checks raw inference output and converts it into a [`PredictionResult`].
///
/// ## Checks
/// 1. The document is an object with a `top_predictions` array
/// 2. Every field present has the expected type (`null` optionals count as absent)
/// 3. Each prediction names a crop and has a probability in `[0, 1]`
/// 4. A present trust score has a level and a finite confidence
///
/// Prediction order is never changed. Out-of-order probabilities are only
/// logged.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseValidator {
    require_trust_score: bool,
}

impl ResponseValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject results that carry no trust score (builder pattern).
    pub fn require_trust_score(mut self, required: bool) -> Self {
        self.require_trust_score = required;
        self
    }

    pub fn validate(&self, output: Value) -> Result<PredictionResult, ValidationError> {
        let object = output
            .as_object()
            .ok_or_else(|| ValidationError::NotAnObject(json_kind(&output)))?;

        match object.get("top_predictions") {
            None => return Err(ValidationError::MissingField("top_predictions")),
            Some(Value::Array(_)) => {}
            Some(_) => {
                return Err(ValidationError::WrongType {
                    field: "top_predictions",
                    expected: "an array",
                });
            }
        }

        let result: PredictionResult =
            serde_json::from_value(output).map_err(|e| ValidationError::Shape(e.to_string()))?;

        for (index, prediction) in result.top_predictions.iter().enumerate() {
            if prediction.crop.trim().is_empty() {
                return Err(ValidationError::InvalidPrediction {
                    index,
                    reason: "crop name is empty".to_string(),
                });
            }
            if !(0.0..=1.0).contains(&prediction.probability) {
                return Err(ValidationError::InvalidPrediction {
                    index,
                    reason: format!("probability {} is outside [0, 1]", prediction.probability),
                });
            }
        }

        match &result.trust_score {
            Some(trust) => check_trust_score(trust)?,
            None if self.require_trust_score => {
                return Err(ValidationError::MissingField("trust_score"));
            }
            None => {}
        }

        let descending = result
            .top_predictions
            .windows(2)
            .all(|pair| pair[0].probability >= pair[1].probability);
        if !descending {
            warn!("predictor returned top_predictions out of probability order; relaying as-is");
        }

        Ok(result)
    }
}

fn check_trust_score(trust: &TrustScore) -> Result<(), ValidationError> {
    if trust.level.trim().is_empty() {
        return Err(ValidationError::InvalidTrustScore(
            "level is empty".to_string(),
        ));
    }
    if !trust.confidence.is_finite() {
        return Err(ValidationError::InvalidTrustScore(format!(
            "confidence {} is not finite",
            trust.confidence
        )));
    }
    if let Some(suggestion) = &trust.counterfactual_suggestion {
        if suggestion.percent_deviation < 0.0 {
            return Err(ValidationError::InvalidTrustScore(format!(
                "percent_deviation {} is negative",
                suggestion.percent_deviation
            )));
        }
    }
    Ok(())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn full_result() -> Value {
        json!({
            "top_predictions": [
                {
                    "rank": 1,
                    "crop": "rice",
                    "probability": 0.82,
                    "image_path": "results/rice.png",
                    "report": "rice is suggested with a probability of 82.00%.",
                    "feature_impact": [
                        { "feature": "Nitrogen", "value": 90.0, "shap": 0.31 },
                        { "feature": "Phosphorus", "value": null, "shap": -0.02 }
                    ]
                },
                { "rank": 2, "crop": "jute", "probability": 0.11 },
                { "rank": 3, "crop": "maize", "probability": 0.04 }
            ],
            "full_report": "As per our prediction:",
            "global_importance_path": "results/global_importance.png",
            "trust_score": {
                "level": "High",
                "confidence": 0.71,
                "counterfactual_suggestion": {
                    "alternative_crop": "jute",
                    "percent_deviation": 12.5,
                    "suggested_changes": [
                        { "feature": "Nitrogen", "current": 90.0, "ideal": 78.4, "change": -11.6 }
                    ]
                }
            }
        })
    }

    #[test]
    fn test_full_result_is_accepted_unchanged() {
        let raw = full_result();
        let result = ResponseValidator::new().validate(raw.clone()).unwrap();

        assert_eq!(result.top_predictions.len(), 3);
        let trust = result.trust_score.as_ref().unwrap();
        assert_eq!(trust.level, "High");
        let suggestion = trust.counterfactual_suggestion.as_ref().unwrap();
        assert_eq!(suggestion.alternative_crop.as_deref(), Some("jute"));
        assert_eq!(suggestion.suggested_changes[0].change, -11.6);

        assert_eq!(serde_json::to_value(&result).unwrap(), raw);
    }

    #[test]
    fn test_minimal_result_round_trips() {
        let raw = json!({ "top_predictions": [{ "crop": "rice", "probability": 0.82 }] });
        let result = ResponseValidator::new().validate(raw.clone()).unwrap();

        assert!(result.trust_score.is_none());
        assert_eq!(
            serde_json::to_string(&result).unwrap(),
            r#"{"top_predictions":[{"crop":"rice","probability":0.82}]}"#
        );
    }

    #[test]
    fn test_order_is_preserved_even_when_not_descending() {
        let raw = json!({
            "top_predictions": [
                { "crop": "maize", "probability": 0.1 },
                { "crop": "rice", "probability": 0.7 },
                { "crop": "jute", "probability": 0.2 }
            ]
        });
        let result = ResponseValidator::new().validate(raw).unwrap();

        let crops: Vec<_> = result.top_predictions.iter().map(|p| p.crop.as_str()).collect();
        assert_eq!(crops, vec!["maize", "rice", "jute"]);
    }

    #[test]
    fn test_non_object_is_rejected() {
        let err = ResponseValidator::new().validate(json!([1, 2])).unwrap_err();
        assert_eq!(err, ValidationError::NotAnObject("an array"));
    }

    #[test]
    fn test_missing_top_predictions() {
        let err = ResponseValidator::new()
            .validate(json!({ "trust_score": { "level": "High", "confidence": 0.5 } }))
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("top_predictions"));
    }

    #[test]
    fn test_top_predictions_wrong_type() {
        let err = ResponseValidator::new()
            .validate(json!({ "top_predictions": "rice" }))
            .unwrap_err();
        assert!(matches!(err, ValidationError::WrongType { field: "top_predictions", .. }));
    }

    #[test]
    fn test_prediction_missing_probability_is_shape_error() {
        let err = ResponseValidator::new()
            .validate(json!({ "top_predictions": [{ "crop": "rice" }] }))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Shape(_)));
    }

    #[test]
    fn test_probability_out_of_range() {
        let err = ResponseValidator::new()
            .validate(json!({ "top_predictions": [{ "crop": "rice", "probability": 1.5 }] }))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPrediction { index: 0, .. }));
    }

    #[test]
    fn test_empty_crop_name() {
        let err = ResponseValidator::new()
            .validate(json!({ "top_predictions": [
                { "crop": "rice", "probability": 0.5 },
                { "crop": "  ", "probability": 0.3 }
            ] }))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPrediction { index: 1, .. }));
    }

    #[test]
    fn test_trust_score_with_wrong_nested_shape() {
        let err = ResponseValidator::new()
            .validate(json!({
                "top_predictions": [],
                "trust_score": { "level": "High" }
            }))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Shape(_)));

        let err = ResponseValidator::new()
            .validate(json!({
                "top_predictions": [],
                "trust_score": {
                    "level": "Low",
                    "confidence": 0.1,
                    "counterfactual_suggestion": { "alternative_crop": "jute" }
                }
            }))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Shape(_)));
    }

    #[test]
    fn test_empty_trust_level() {
        let err = ResponseValidator::new()
            .validate(json!({
                "top_predictions": [],
                "trust_score": { "level": "", "confidence": 0.1 }
            }))
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidTrustScore(_)));
    }

    #[test]
    fn test_null_trust_score_is_treated_as_absent() {
        let result = ResponseValidator::new()
            .validate(json!({ "top_predictions": [], "trust_score": null }))
            .unwrap();
        assert!(result.trust_score.is_none());
    }

    #[test]
    fn test_required_trust_score() {
        let validator = ResponseValidator::new().require_trust_score(true);

        let err = validator
            .validate(json!({ "top_predictions": [{ "crop": "rice", "probability": 0.82 }] }))
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingField("trust_score"));

        assert!(validator.validate(full_result()).is_ok());
    }
}

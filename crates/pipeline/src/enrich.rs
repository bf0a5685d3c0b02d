//! Feature enrichment.
//!
//! Turns a partial [`PredictionRequest`] into the complete
//! [`EnrichedFeatures`] vector: soil values pass through untouched and the
//! climate values come from the weather lookup.

use domain::{Climate, Coordinate, EnrichedFeatures, PredictionRequest};
use tracing::debug;

/// Startup-selected enrichment behaviour.
///
/// With `enabled = false` the request body is forwarded to the predictor
/// as-is and no weather lookup happens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichmentPolicy {
    pub enabled: bool,
    pub default_coordinate: Coordinate,
    pub fallback: Climate,
}

impl Default for EnrichmentPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            default_coordinate: Coordinate::REFERENCE,
            fallback: Climate::FALLBACK,
        }
    }
}

/// Builds enriched feature vectors according to an [`EnrichmentPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEnricher {
    policy: EnrichmentPolicy,
}

impl FeatureEnricher {
    pub fn new(policy: EnrichmentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EnrichmentPolicy {
        &self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.enabled
    }

    /// Coordinate to look weather up for.
    ///
    /// Each component missing from the request (or the whole location) is
    /// taken from the default coordinate.
    pub fn coordinate_for(&self, request: &PredictionRequest) -> Coordinate {
        let default = self.policy.default_coordinate;
        let location = request.location.unwrap_or_default();

        let coordinate = Coordinate {
            latitude: location.latitude.unwrap_or(default.latitude),
            longitude: location.longitude.unwrap_or(default.longitude),
        };
        if request.location.is_none() {
            debug!(
                "no location in request, using default coordinate ({}, {})",
                default.latitude, default.longitude
            );
        }
        coordinate
    }

    /// Combine the caller's soil measurements with the resolved climate.
    pub fn enrich(&self, request: &PredictionRequest, climate: Climate) -> EnrichedFeatures {
        EnrichedFeatures {
            n: request.n,
            p: request.p,
            k: request.k,
            ph: request.ph,
            temperature: climate.temperature,
            humidity: climate.humidity,
            rainfall: climate.rainfall,
        }
    }
}

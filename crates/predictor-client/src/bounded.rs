//! Admission control in front of a predictor.
//!
//! Each inference holds an OS process (or some other scarce backend slot),
//! so concurrency is capped with a semaphore. Callers that cannot get a
//! permit within the queue timeout are turned away with
//! [`PredictorError::Saturated`] instead of piling up.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, warn};

use crate::{Predictor, PredictorError, PredictorInput};

/// Wraps a predictor and limits how many calls run at once.
pub struct BoundedPredictor<P> {
    inner: P,
    permits: Semaphore,
    capacity: usize,
    queue_timeout: Duration,
}

impl<P: Predictor> BoundedPredictor<P> {
    /// Create a bounded predictor.
    ///
    /// # Arguments
    /// * `inner` - The predictor doing the actual work
    /// * `capacity` - Maximum concurrent calls (must be at least 1)
    /// * `queue_timeout` - How long a call may wait for a free slot; zero rejects immediately
    pub fn new(inner: P, capacity: usize, queue_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            permits: Semaphore::new(capacity),
            capacity,
            queue_timeout,
        }
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    async fn admit(&self) -> Result<SemaphorePermit<'_>, PredictorError> {
        let saturated = PredictorError::Saturated {
            capacity: self.capacity,
        };

        if self.queue_timeout.is_zero() {
            return self.permits.try_acquire().map_err(|_| {
                warn!("predictor saturated ({} in flight), rejecting", self.capacity);
                saturated
            });
        }

        match tokio::time::timeout(self.queue_timeout, self.permits.acquire()).await {
            Ok(Ok(permit)) => Ok(permit),
            _ => {
                warn!(
                    "no predictor slot freed within {:?}, rejecting",
                    self.queue_timeout
                );
                Err(saturated)
            }
        }
    }
}

#[async_trait]
impl<P: Predictor> Predictor for BoundedPredictor<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn predict(&self, input: &PredictorInput) -> Result<Value, PredictorError> {
        let _permit = self.admit().await?;
        debug!(
            "admitted predictor call ({} of {} slots free)",
            self.available(),
            self.capacity
        );
        self.inner.predict(input).await
    }

    fn capacity(&self) -> Option<usize> {
        Some(self.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use domain::EnrichedFeatures;
    use serde_json::json;
    use tokio::sync::Notify;

    /// Predictor that blocks until the test releases it
    #[derive(Default)]
    struct GatedPredictor {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl Predictor for GatedPredictor {
        fn name(&self) -> &str {
            "gated"
        }

        async fn predict(&self, _input: &PredictorInput) -> Result<Value, PredictorError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(json!({ "top_predictions": [] }))
        }
    }

    fn sample_input() -> PredictorInput {
        PredictorInput::Enriched(EnrichedFeatures {
            n: Some(90.0),
            p: Some(42.0),
            k: Some(43.0),
            ph: Some(6.5),
            temperature: 25.0,
            humidity: 70.0,
            rainfall: 3.0,
        })
    }

    #[tokio::test]
    async fn test_rejects_when_full_and_queue_timeout_is_zero() {
        let gate = Arc::new(GatedPredictor::default());
        let bounded = Arc::new(BoundedPredictor::new(gate.clone(), 1, Duration::ZERO));

        let first = tokio::spawn({
            let bounded = bounded.clone();
            async move { bounded.predict(&sample_input()).await }
        });
        gate.entered.notified().await;
        assert_eq!(bounded.available(), 0);

        let err = bounded.predict(&sample_input()).await.unwrap_err();
        assert!(matches!(err, PredictorError::Saturated { capacity: 1 }));

        gate.release.notify_one();
        first.await.unwrap().unwrap();
        assert_eq!(bounded.available(), 1, "Permit should be returned");
    }

    #[tokio::test]
    async fn test_queued_call_runs_once_a_slot_frees() {
        let gate = Arc::new(GatedPredictor::default());
        let bounded = Arc::new(BoundedPredictor::new(
            gate.clone(),
            1,
            Duration::from_secs(5),
        ));

        let first = tokio::spawn({
            let bounded = bounded.clone();
            async move { bounded.predict(&sample_input()).await }
        });
        gate.entered.notified().await;

        let second = tokio::spawn({
            let bounded = bounded.clone();
            async move { bounded.predict(&sample_input()).await }
        });

        gate.release.notify_one();
        first.await.unwrap().unwrap();

        gate.entered.notified().await;
        gate.release.notify_one();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_queue_timeout_expires() {
        let gate = Arc::new(GatedPredictor::default());
        let bounded = Arc::new(BoundedPredictor::new(
            gate.clone(),
            1,
            Duration::from_millis(20),
        ));

        let first = tokio::spawn({
            let bounded = bounded.clone();
            async move { bounded.predict(&sample_input()).await }
        });
        gate.entered.notified().await;

        let err = bounded.predict(&sample_input()).await.unwrap_err();
        assert!(matches!(err, PredictorError::Saturated { .. }));

        gate.release.notify_one();
        first.await.unwrap().unwrap();
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let bounded = BoundedPredictor::new(GatedPredictor::default(), 0, Duration::ZERO);
        assert_eq!(bounded.capacity(), Some(1));
        assert_eq!(bounded.available(), 1);
    }
}

use crate::config::PredictionConfig;
use crate::predictor::{AgeEstimate, AgePredictor, PredictionError};
use async_trait::async_trait;
use rand::Rng;
use std::ops::RangeInclusive;
use tokio::time::{sleep, Duration};

/// Stand-in for the real age-estimation endpoint: waits out a fixed latency,
/// then answers with a randomized age and confidence.
pub struct MockAgePredictor {
    latency: Duration,
    age_range: RangeInclusive<u32>,
    confidence_range: RangeInclusive<f32>,
    failure_rate: f32,
}

impl MockAgePredictor {
    pub fn new(config: &PredictionConfig) -> Self {
        Self {
            latency: Duration::from_millis(config.latency_ms),
            age_range: config.min_age..=config.max_age,
            confidence_range: config.min_confidence..=1.0,
            failure_rate: config.failure_rate,
        }
    }
}

#[async_trait]
impl AgePredictor for MockAgePredictor {
    async fn predict(&self, _jpeg: &[u8]) -> Result<AgeEstimate, PredictionError> {
        sleep(self.latency).await;

        let (estimate, failed) = {
            let mut rng = rand::rng();
            let estimate = AgeEstimate {
                age: rng.random_range(self.age_range.clone()),
                confidence: rng.random_range(self.confidence_range.clone()),
            };
            (estimate, rng.random::<f32>() < self.failure_rate)
        };

        if failed {
            return Err(PredictionError::Rejected(
                "simulated prediction service failure".into(),
            ));
        }

        Ok(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(failure_rate: f32) -> PredictionConfig {
        PredictionConfig {
            latency_ms: 1500,
            min_age: 18,
            max_age: 77,
            min_confidence: 0.7,
            failure_rate,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn estimates_stay_within_configured_ranges() {
        let predictor = MockAgePredictor::new(&test_config(0.0));

        for _ in 0..50 {
            let estimate = predictor.predict(b"jpeg").await.unwrap();
            assert!((18..=77).contains(&estimate.age));
            assert!((0.7..=1.0).contains(&estimate.confidence));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_failure_rate_always_rejects() {
        let predictor = MockAgePredictor::new(&test_config(1.0));

        let result = predictor.predict(b"jpeg").await;
        assert!(matches!(result, Err(PredictionError::Rejected(_))));
    }
}

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictionError {
    #[error("Prediction service rejected the request: {0}")]
    Rejected(String),
    #[error("Prediction service returned malformed data: {0}")]
    MalformedResponse(String),
}

/// One age estimate as returned by the prediction collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgeEstimate {
    pub age: u32,
    pub confidence: f32,
}

/// Seam over the age-prediction endpoint. Input is a single compressed
/// still image; any rejection is terminal for that capture attempt.
#[async_trait]
pub trait AgePredictor: Send + Sync + 'static {
    async fn predict(&self, jpeg: &[u8]) -> Result<AgeEstimate, PredictionError>;
}

use crate::controller::{CaptureError, CaptureOutcome};
use crate::device::DeviceAccessError;
use crate::server::SharedState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::time::Instant;
use tracing::instrument;

impl IntoResponse for DeviceAccessError {
    fn into_response(self) -> Response {
        (StatusCode::SERVICE_UNAVAILABLE, self.to_string()).into_response()
    }
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        let status = match self {
            CaptureError::SessionInactive => StatusCode::BAD_REQUEST,
            CaptureError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CaptureError::Prediction(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

#[instrument(skip(state))]
pub async fn start_camera(State(state): State<SharedState>) -> Result<StatusCode, DeviceAccessError> {
    state.controller.start_capture().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn stop_camera(State(state): State<SharedState>) -> StatusCode {
    state.controller.stop_capture().await;
    StatusCode::NO_CONTENT
}

#[instrument(skip(state))]
pub async fn capture_photo(State(state): State<SharedState>) -> Response {
    let started = Instant::now();

    match state.controller.capture_and_predict().await {
        Ok(CaptureOutcome::Predicted(result)) => {
            state
                .metrics
                .record_prediction_duration(started.elapsed().as_millis() as u64);
            state.metrics.record_capture("ok");
            state.metrics.record_feed_size(state.feed.len() as u64);
            (StatusCode::OK, Json(result)).into_response()
        }
        Ok(CaptureOutcome::Dropped) => {
            state.metrics.record_capture("dropped");
            (
                StatusCode::CONFLICT,
                "A capture is already being processed",
            )
                .into_response()
        }
        Err(e) => {
            state.metrics.record_capture("error");
            e.into_response()
        }
    }
}

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

mod capture;
mod health;
mod metrics;
mod predictions;
mod status;
mod video_feed;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/healthcheck", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/status", get(status::camera_status))
        .route("/camera/start", post(capture::start_camera))
        .route("/camera/stop", post(capture::stop_camera))
        .route("/capture", post(capture::capture_photo))
        .route("/predictions", get(predictions::list_predictions))
        .route("/predictions/{id}/image", get(predictions::prediction_image))
        .route("/video_feed", get(video_feed::video_feed))
}

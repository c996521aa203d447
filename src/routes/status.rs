use crate::server::SharedState;
use axum::{extract::State, response::Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct CameraStatus {
    camera_active: bool,
    processing: bool,
    last_error: Option<String>,
}

pub async fn camera_status(State(state): State<SharedState>) -> Json<CameraStatus> {
    Json(CameraStatus {
        camera_active: state.controller.is_active().await,
        processing: state.controller.is_processing(),
        last_error: state.controller.last_error(),
    })
}

use crate::server::SharedState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::instrument;

#[instrument(skip(state))]
pub async fn list_predictions(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.feed.snapshot())
}

#[instrument(skip(state))]
pub async fn prediction_image(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Response {
    match state.feed.image_for(&id) {
        Some(jpeg) => Response::builder()
            .header(header::CONTENT_TYPE, "image/jpeg")
            .body(Body::from(jpeg))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        None => (StatusCode::NOT_FOUND, "No prediction with that id").into_response(),
    }
}

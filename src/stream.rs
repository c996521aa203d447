use crate::app::AppController;
use crate::device::CaptureEncodingError;
use bytes::Bytes;
use futures::stream;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::time::sleep;
use tracing::instrument;

// Must match the boundary declared in the video_feed Content-Type header.
const FRAME_BOUNDARY: &str = "frame";

#[derive(Clone)]
pub struct VideoStream {
    controller: Arc<AppController>,
    frame_delay_ms: u64,
}

#[derive(Error, Debug)]
pub enum VideoStreamError {
    #[error("Camera error: {0}")]
    Camera(#[from] CaptureEncodingError),
    #[error("Http builder error: {0}")]
    HttpBuilderError(String),
}

impl VideoStream {
    pub fn new(controller: Arc<AppController>, frame_delay_ms: u64) -> Self {
        Self {
            controller,
            frame_delay_ms,
        }
    }

    /// Multipart JPEG preview stream. Ends when the camera session goes
    /// inactive; the browser reconnects after the next start.
    #[instrument(skip(self))]
    pub fn generate_stream(self) -> impl futures::Stream<Item = Result<Bytes, VideoStreamError>> {
        let controller = self.controller.clone();

        stream::unfold(controller, move |controller| async move {
            sleep(Duration::from_millis(self.frame_delay_ms)).await;
            match controller.preview_jpeg().await {
                Ok(Some(frame)) => {
                    Some((Ok::<_, VideoStreamError>(frame_part(&frame)), controller))
                }
                Ok(None) => None,
                Err(e) => {
                    tracing::error!("Error getting preview frame: {:?}", e);
                    Some((Err(VideoStreamError::from(e)), controller))
                }
            }
        })
    }
}

fn frame_part(frame: &[u8]) -> Bytes {
    let part_header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        FRAME_BOUNDARY,
        frame.len()
    );
    let mut body = part_header.into_bytes();
    body.extend_from_slice(frame);
    body.extend_from_slice(b"\r\n");
    Bytes::from(body)
}

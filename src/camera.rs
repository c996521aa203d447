use crate::config::CameraConfig;
use crate::device::{CaptureEncodingError, DeviceAccessError, VideoDevice};
use async_trait::async_trait;
use bytes::Bytes;
use opencv::{core::Mat, core::Vector, imgcodecs, prelude::*, videoio};
use tokio::{sync::Mutex, task};

/// Webcam handle backed by OpenCV's `VideoCapture`.
#[derive(Debug)]
pub struct OpenCvCamera {
    capture: Mutex<videoio::VideoCapture>,
    jpeg_quality: i32,
}

#[async_trait]
impl VideoDevice for OpenCvCamera {
    async fn acquire(config: &CameraConfig) -> Result<Self, DeviceAccessError> {
        let jpeg_quality = config.jpeg_quality;
        let config = config.clone();

        // Opening the device blocks on driver calls, so it runs off the
        // runtime where the controller can race it against its timeout.
        let capture = task::spawn_blocking(move || open_capture(&config))
            .await
            .map_err(|e| DeviceAccessError::Backend(e.to_string()))??;

        Ok(Self {
            capture: Mutex::new(capture),
            jpeg_quality,
        })
    }

    async fn capture_jpeg(&self) -> Result<Bytes, CaptureEncodingError> {
        let mut cam = self.capture.lock().await;
        let mut frame = Mat::default();
        let grabbed = cam
            .read(&mut frame)
            .map_err(|e| CaptureEncodingError::ReadFrameFailed(e.to_string()))?;
        if !grabbed || frame.empty() {
            return Err(CaptureEncodingError::EmptyFrame);
        }

        let params = Vector::from_slice(&[imgcodecs::IMWRITE_JPEG_QUALITY, self.jpeg_quality]);
        let mut buf = Vector::<u8>::new();
        imgcodecs::imencode(".jpg", &frame, &mut buf, &params)
            .map_err(|e| CaptureEncodingError::EncodeFrameFailed(e.to_string()))?;

        let bytes: Vec<u8> = buf.into();
        Ok(Bytes::from(bytes))
    }

    async fn release(self) {
        let mut capture = self.capture.into_inner();
        if let Err(e) = capture.release() {
            tracing::warn!("Failed to release camera handle: {:?}", e);
        }
    }
}

fn open_capture(config: &CameraConfig) -> Result<videoio::VideoCapture, DeviceAccessError> {
    let mut capture = videoio::VideoCapture::new(config.device_index, videoio::CAP_ANY)
        .map_err(|e| map_open_error(e, config.device_index))?;

    if !capture
        .is_opened()
        .map_err(|e| DeviceAccessError::Backend(e.to_string()))?
    {
        return Err(DeviceAccessError::NoDevice(config.device_index));
    }

    // Ideal constraints. `set` returning false means the backend kept its
    // native mode, which is acceptable.
    let _ = capture.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64);
    let _ = capture.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64);
    let _ = capture.set(videoio::CAP_PROP_FPS, config.fps as f64);

    Ok(capture)
}

fn map_open_error(err: opencv::Error, device_index: i32) -> DeviceAccessError {
    let message = err.to_string();
    if message.to_lowercase().contains("permission") {
        DeviceAccessError::PermissionDenied(message)
    } else if message.to_lowercase().contains("can't open") {
        DeviceAccessError::NoDevice(device_index)
    } else {
        DeviceAccessError::Backend(message)
    }
}

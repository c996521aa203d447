use crate::config::CameraConfig;
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeviceAccessError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("No camera device available at index {0}")]
    NoDevice(i32),
    #[error("Camera acquisition timed out after {0} seconds")]
    Timeout(u64),
    #[error("Camera backend error: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum CaptureEncodingError {
    #[error("Failed to read frame from device: {0}")]
    ReadFrameFailed(String),
    #[error("Device produced an empty frame")]
    EmptyFrame,
    #[error("Failed to encode frame as JPEG: {0}")]
    EncodeFrameFailed(String),
}

/// Seam over camera hardware. The returned handle owns the underlying
/// device until released or dropped.
#[async_trait]
pub trait VideoDevice: Sized + Send + Sync + 'static {
    async fn acquire(config: &CameraConfig) -> Result<Self, DeviceAccessError>;

    /// Grabs the current frame as compressed JPEG bytes.
    async fn capture_jpeg(&self) -> Result<Bytes, CaptureEncodingError>;

    async fn release(self);
}
